pub mod simfile;

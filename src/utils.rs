pub mod clonecell;
pub mod copyhashmap;
pub mod linkedlist;
pub mod numcell;
pub mod ptr_ext;

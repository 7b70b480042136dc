pub mod raw_val;

pub mod export;
pub mod forcing_csv;

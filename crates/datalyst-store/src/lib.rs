pub mod dataset;
pub mod ingest;

pub use dataset::DatasetStore;
pub use ingest::CsvDataset;

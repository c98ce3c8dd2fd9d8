pub mod database;
pub mod document;
pub mod memory;

pub use database::{
    AllDocsOptions, AllDocsResponse, AllDocsRow, BulkDocResult, BulkDocsOptions, Change,
    ChangesOptions, ChangesResponse, Database, DatabaseInfo, DbHandle, GetOptions, WriteFailure,
    WriteResult,
};
pub use document::{Document, DocumentWrite, Revision};
pub use memory::MemoryDatabase;

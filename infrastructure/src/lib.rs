// Module declarations
pub mod persistence;

// Re-export implementations
pub use persistence::InMemoryStudentRepository;

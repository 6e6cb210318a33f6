use async_trait::async_trait;
use domain::{DomainError, Student, StudentFilter};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

// --- Application Errors ---
// Display strings are the user-facing messages placed in the response envelope.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("Mahasiswa dengan NIM {0} sudah ada.")]
    Conflict(String),
    #[error("Mahasiswa dengan NIM {0} tidak ditemukan.")]
    NotFound(String),
    #[error("{}", INVALID_CREATE_MESSAGE)]
    Domain(#[from] DomainError), // Presence checks failed on a new record
}

impl ApplicationError {
    /// Payload carried in the envelope's `data` field for this error.
    pub fn data(&self) -> Option<Value> {
        match self {
            ApplicationError::Conflict(nim) => Some(json!({ "nim": nim })),
            _ => None,
        }
    }
}

pub const INVALID_CREATE_MESSAGE: &str = "Data mahasiswa tidak valid.";
pub const INVALID_UPDATE_MESSAGE: &str = "Data update tidak valid atau NIM tidak cocok.";

// --- Infrastructure Interfaces (Traits) ---

/// Ordered storage for student records.
///
/// Every method is atomic with respect to the others: the check and the
/// mutation of `insert`, `replace` and `remove` happen under one critical
/// section so the unique-NIM invariant cannot be broken by concurrent callers.
#[async_trait]
pub trait StudentRepository: Send + Sync {
    /// Returns all records matching the filter, in insertion order.
    async fn list(&self, filter: &StudentFilter) -> Result<Vec<Student>, ApplicationError>;
    /// Retrieves the record whose NIM matches case-insensitively.
    async fn get(&self, nim: &str) -> Result<Option<Student>, ApplicationError>;
    /// Appends a record. Fails with `Conflict` if the NIM is already taken.
    async fn insert(&self, student: Student) -> Result<(), ApplicationError>;
    /// Replaces the record matching `nim` in place. Returns false if none matched.
    async fn replace(&self, nim: &str, student: Student) -> Result<bool, ApplicationError>;
    /// Removes the record matching `nim`. Returns false if none matched.
    async fn remove(&self, nim: &str) -> Result<bool, ApplicationError>;
}

// --- Request/Response Models (Data Transfer Objects - DTOs) ---

/// Body of create and update requests. Every field is optional here so that
/// presence is checked by the domain rather than by the JSON extractor.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct StudentRequest {
    #[serde(alias = "id")]
    pub nim: Option<String>,
    #[serde(alias = "name")]
    pub nama: Option<String>,
    #[serde(alias = "department")]
    pub jurusan: Option<String>,
    #[serde(alias = "gpa")]
    pub ipk: Option<f64>,
}

impl StudentRequest {
    fn into_student(self) -> Result<Student, DomainError> {
        Student::new(
            self.nim.unwrap_or_default(),
            self.nama.unwrap_or_default(),
            self.jurusan,
            self.ipk.unwrap_or_default(),
        )
    }
}

/// Filters of the list endpoint, built from the raw query pairs so that
/// aliases and repeated keys never reject the request.
#[derive(Debug, Default, PartialEq)]
pub struct ListStudentsQuery {
    pub nim: Option<String>,
    pub nama: Option<String>,
}

impl ListStudentsQuery {
    /// Accepts `nim`/`id` and `nama`/`name`; the first non-blank value of each
    /// wins and unknown keys are ignored.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = Self::default();
        for (key, value) in pairs {
            if value.trim().is_empty() {
                continue;
            }
            let slot = match key.as_str() {
                "nim" | "id" => &mut query.nim,
                "nama" | "name" => &mut query.nama,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        query
    }
}

impl From<ListStudentsQuery> for StudentFilter {
    fn from(query: ListStudentsQuery) -> Self {
        StudentFilter::new(query.nim, query.nama)
    }
}

/// Envelope shared by every endpoint: `{ status, message, data }`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn new(status: u16, message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            status,
            message: message.into(),
            data,
        }
    }
}

// --- Application Services (Use Cases) ---

/// Use cases over the student collection.
pub struct StudentService {
    repo: Arc<dyn StudentRepository>,
}

impl StudentService {
    pub fn new(repo: Arc<dyn StudentRepository>) -> Self {
        Self { repo }
    }

    #[instrument(skip(self))]
    pub async fn list_students(
        &self,
        filter: StudentFilter,
    ) -> Result<Vec<Student>, ApplicationError> {
        info!("Searching student records");
        if let Some(nim) = filter.nim() {
            debug!(nim = %nim, "Filtering by NIM");
        }
        if let Some(name) = filter.name() {
            debug!(name = %name, "Filtering by name");
        }
        let students = self.repo.list(&filter).await?;
        if students.is_empty() {
            warn!("No student matched the search criteria");
        }
        Ok(students)
    }

    #[instrument(skip(self))]
    pub async fn get_student(&self, nim: &str) -> Result<Student, ApplicationError> {
        info!("Looking up student");
        self.repo.get(nim).await?.ok_or_else(|| {
            warn!(nim = %nim, "Student not found");
            ApplicationError::NotFound(nim.to_string())
        })
    }

    #[instrument(skip(self, request), fields(nim = ?request.nim))]
    pub async fn create_student(
        &self,
        request: StudentRequest,
    ) -> Result<Student, ApplicationError> {
        let student = request.into_student().inspect_err(|e| {
            warn!("Rejected invalid student: {}", e);
        })?;

        // Repository performs the duplicate check atomically with the append
        self.repo.insert(student.clone()).await.inspect_err(|e| {
            if matches!(e, ApplicationError::Conflict(_)) {
                warn!(nim = %student.nim, "NIM already exists");
            }
        })?;
        info!(nim = %student.nim, name = %student.name, "Student added");
        Ok(student)
    }

    #[instrument(skip(self, request))]
    pub async fn update_student(
        &self,
        nim: &str,
        request: Option<StudentRequest>,
    ) -> Result<Student, ApplicationError> {
        let invalid = || ApplicationError::InvalidInput(INVALID_UPDATE_MESSAGE.to_string());

        let request = request.ok_or_else(|| {
            warn!("Update rejected: missing body");
            invalid()
        })?;
        let student = request.into_student().map_err(|e| {
            warn!("Update rejected: {}", e);
            invalid()
        })?;
        if !student.nim.matches(nim) {
            warn!(body_nim = %student.nim, "Update rejected: NIM mismatch");
            return Err(invalid());
        }

        if !self.repo.replace(nim, student.clone()).await? {
            warn!("Student not found for update");
            return Err(ApplicationError::NotFound(nim.to_string()));
        }
        info!("Student updated");
        Ok(student)
    }

    #[instrument(skip(self))]
    pub async fn delete_student(&self, nim: &str) -> Result<(), ApplicationError> {
        if !self.repo.remove(nim).await? {
            warn!("Student not found for deletion");
            return Err(ApplicationError::NotFound(nim.to_string()));
        }
        info!("Student deleted");
        Ok(())
    }
}

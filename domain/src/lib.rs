use serde::Serialize;
use std::fmt;
use thiserror::Error;

// --- Domain Errors ---
#[derive(Error, Debug, PartialEq)]
pub enum DomainError {
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),
}

// --- Student ID (NIM) ---

/// National student ID. Equality between NIMs is case-insensitive, so every
/// lookup goes through [`Nim::matches`] instead of comparing raw strings.
/// The only constructor is [`Nim::parse`], so a NIM is never blank.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct Nim(String);

impl Nim {
    /// Builds a NIM, rejecting blank input.
    pub fn parse(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(DomainError::MissingField("nim"));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against a raw NIM (e.g. a path segment).
    pub fn matches(&self, other: &str) -> bool {
        self.0 == other || self.0.to_lowercase() == other.to_lowercase()
    }
}

impl PartialEq for Nim {
    fn eq(&self, other: &Self) -> bool {
        self.matches(&other.0)
    }
}

impl Eq for Nim {}

impl fmt::Display for Nim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Nim> for String {
    fn from(nim: Nim) -> Self {
        nim.0
    }
}

// --- Student Record ---

/// A single student record. Serialized with the field names clients of the
/// service already use (`nim`, `nama`, `jurusan`, `ipk`).
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Student {
    pub nim: Nim,
    #[serde(rename = "nama")]
    pub name: String,
    #[serde(rename = "jurusan")]
    pub department: Option<String>,
    #[serde(rename = "ipk")]
    pub gpa: f64,
}

impl Student {
    /// Creates a student, enforcing the presence of `nim` and `name`.
    pub fn new(
        nim: impl Into<String>,
        name: impl Into<String>,
        department: Option<String>,
        gpa: f64,
    ) -> Result<Self, DomainError> {
        let nim = Nim::parse(nim)?;
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::MissingField("nama"));
        }
        Ok(Self {
            nim,
            name,
            department,
            gpa,
        })
    }
}

// --- Query Filter ---

/// Optional list filters. Blank values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentFilter {
    nim: Option<String>,
    name: Option<String>,
}

impl StudentFilter {
    pub fn new(nim: Option<String>, name: Option<String>) -> Self {
        let non_blank = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        Self {
            nim: non_blank(nim),
            name: non_blank(name).map(|n| n.to_lowercase()),
        }
    }

    pub fn nim(&self) -> Option<&str> {
        self.nim.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.nim.is_none() && self.name.is_none()
    }

    /// Exact (case-insensitive) match on NIM, substring (case-insensitive) match on name.
    pub fn matches(&self, student: &Student) -> bool {
        if let Some(nim) = &self.nim {
            if !student.nim.matches(nim) {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if !student.name.to_lowercase().contains(name.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Records the store is populated with at process start.
pub fn seed_students() -> Vec<Student> {
    let rpl = || Some("RPL".to_string());
    vec![
        Student {
            nim: Nim("103022300017".to_string()),
            name: "Indra Yuda".to_string(),
            department: rpl(),
            gpa: 3.8,
        },
        Student {
            nim: Nim("103022300023".to_string()),
            name: "Azwa Radya".to_string(),
            department: rpl(),
            gpa: 3.7,
        },
        Student {
            nim: Nim("103022300027".to_string()),
            name: "April Hardinata".to_string(),
            department: rpl(),
            gpa: 3.9,
        },
    ]
}

// ./infrastructure/src/persistence/in_memory_repository.rs
use application::{ApplicationError, StudentRepository};
use async_trait::async_trait;
use domain::{Student, StudentFilter, seed_students};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Ordered, process-lifetime student store.
///
/// A `Vec` keeps insertion order for listing and in-place replacement. Each
/// mutating call holds the write guard across its lookup and its mutation.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStudentRepository {
    students: Arc<RwLock<Vec<Student>>>,
}

impl InMemoryStudentRepository {
    pub fn new() -> Self {
        Self::with_students(Vec::new())
    }

    /// Store pre-populated with the fixed startup records.
    pub fn seeded() -> Self {
        Self::with_students(seed_students())
    }

    pub fn with_students(students: Vec<Student>) -> Self {
        Self {
            students: Arc::new(RwLock::new(students)),
        }
    }
}

fn position_of(students: &[Student], nim: &str) -> Option<usize> {
    students.iter().position(|s| s.nim.matches(nim))
}

#[async_trait]
impl StudentRepository for InMemoryStudentRepository {
    #[instrument(skip(self))]
    async fn list(&self, filter: &StudentFilter) -> Result<Vec<Student>, ApplicationError> {
        let students = self.students.read().await;
        let matched: Vec<Student> = students
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        debug!(total = students.len(), matched = matched.len(), "Listed students from in-memory store");
        Ok(matched)
    }

    #[instrument(skip(self))]
    async fn get(&self, nim: &str) -> Result<Option<Student>, ApplicationError> {
        debug!("Getting student from in-memory store");
        let students = self.students.read().await;
        Ok(position_of(&students, nim).map(|i| students[i].clone()))
    }

    #[instrument(skip(self, student), fields(nim = %student.nim))]
    async fn insert(&self, student: Student) -> Result<(), ApplicationError> {
        let mut students = self.students.write().await;
        if position_of(&students, student.nim.as_str()).is_some() {
            return Err(ApplicationError::Conflict(student.nim.into()));
        }
        debug!("Appending student to in-memory store");
        students.push(student);
        Ok(())
    }

    #[instrument(skip(self, student))]
    async fn replace(&self, nim: &str, student: Student) -> Result<bool, ApplicationError> {
        let mut students = self.students.write().await;
        match position_of(&students, nim) {
            Some(index) => {
                debug!(index, "Replacing student in in-memory store");
                students[index] = student;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[instrument(skip(self))]
    async fn remove(&self, nim: &str) -> Result<bool, ApplicationError> {
        let mut students = self.students.write().await;
        match position_of(&students, nim) {
            Some(index) => {
                debug!(index, "Removing student from in-memory store");
                students.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

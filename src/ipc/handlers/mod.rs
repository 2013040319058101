pub mod attendance;
pub mod classes;
pub mod core;
pub mod enrollments;
pub mod students;

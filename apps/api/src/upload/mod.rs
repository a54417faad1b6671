// Intake: reads the multipart form, gates the file, stores it under a safe name.

pub mod handlers;
pub mod multipart;
pub mod naming;
pub mod validator;

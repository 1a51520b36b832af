pub mod lab_managers;
pub mod snapshot;

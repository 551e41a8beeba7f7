pub mod csv;
pub mod sac;
pub mod text;

//! Concrete service clients.

pub mod darksky;
pub mod google;

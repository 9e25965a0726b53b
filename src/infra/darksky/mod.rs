mod client;

pub use client::DarkSkyClient;

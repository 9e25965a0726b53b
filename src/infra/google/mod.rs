mod client;

pub use client::GoogleGeocoder;

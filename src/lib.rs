//! Unibridge - university application platform
//!
//! REST backend for students applying to universities abroad: catalogue,
//! applications, subscriptions and payments, scholarships, courses,
//! consultations, support, chat and a blog.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;

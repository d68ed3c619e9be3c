//! Core business logic for chorus.
//!
//! Every operation takes the calling [`Caller`] first and passes it through
//! the authorization guard before touching the store. Side effects that
//! other users observe go through the [`FanoutService`], which writes
//! notifications and publishes to the in-process [`EventBus`].

pub mod services;

pub use services::*;

//! Application layer use cases for the server.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure rules in `synergy_core`) and the infrastructure (OS, network,
//! storage).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** domain objects to fulfil a user goal (e.g., "hand the
//!   cursor to the laptop when it crosses the right edge").
//! - **Depend on abstractions** (traits) rather than concrete implementations,
//!   so the infrastructure can be swapped without changing this code.
//! - **Contain no OS calls, no socket I/O, no file system access**.
//!
//! # Sub-modules
//!
//! - **`route_input`** – The active-screen state machine.  Receives primary
//!   input and client records, decides which screen owns the cursor and
//!   forwards input there.  Runs on every keystroke and mouse movement.
//!
//! - **`manage_clients`** – The registry of connected secondary screens.
//!
//! - **`update_layout`** – Builds and edits the screen graph from the
//!   configured screens and links.
//!
//! - **`status`** – The serialisable snapshot served by the admin surface.

pub mod manage_clients;
pub mod route_input;
pub mod status;
pub mod update_layout;

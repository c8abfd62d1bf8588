/// File access subsystem
///
/// This module handles picking a local source file once and reusing it:
/// - Handle capability and permission states (handle.rs)
/// - Silent-then-prompted permission checks (permission.rs)
/// - Native file picker (picker.rs)
/// - Pick / restore / read lifecycle (session.rs)

pub mod handle;
pub mod permission;
pub mod picker;
pub mod session;

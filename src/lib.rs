// Library root
// -----------
// Thin client for the remote image/video denoising inference service. The
// binary (`main.rs`) wires these modules into the fixed demo sequence.
//
// Module responsibilities:
// - `config`: server host/port/timeout, read once at startup.
// - `error`: the closed set of fatal-to-call failure kinds.
// - `api`: blocking HTTP transport (uploads, artifact downloads) and the
//   single decoding boundary for server responses.
// - `store`: lifecycle and path naming for the local `results/` tree.
// - `tasks`: the single-image, batch-folder and video workflows that tie
//   transport and store together and emit audit records.
//
// Keeping transport, storage and orchestration apart makes the workflows
// testable without a running server.
pub mod api;
pub mod config;
pub mod error;
pub mod store;
pub mod tasks;

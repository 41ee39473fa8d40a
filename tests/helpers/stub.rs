//! Command builders for the stub inference server
//!
//! Cargo builds the `mapsynth-stub` binary alongside the test suite and
//! exposes its path through the `CARGO_BIN_EXE_*` environment variable.

/// Server command that binds a free port and announces readiness at once
pub fn ready_command() -> Vec<String> {
    vec![env!("CARGO_BIN_EXE_mapsynth-stub").to_string()]
}

/// Server command with extra stub flags appended
pub fn stub_command_with(flags: &[&str]) -> Vec<String> {
    let mut command = ready_command();
    command.extend(flags.iter().map(|flag| flag.to_string()));
    command
}

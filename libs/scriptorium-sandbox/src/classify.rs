/// Outcome classification - turns a raw container run into one outcome
///
/// Pure function of the run and the limits; knows nothing about Docker.
///
/// **Precedence:**
/// 1. Capture overflow       → OutputOverflow (empty output, fixed message)
/// 2. OOM kill               → MemoryExceeded (empty output, fixed message)
/// 3. Deadline / timeout exit → TimedOut (partial stdout plus notice, empty error)
/// 4. Exit code 0            → Completed (stdout/stderr passed through)
/// 5. Anything else          → CompileOrRuntimeError (stdout, stderr, exit code)
///
/// Overflow and OOM stay separate: one is caught at the capture layer, the
/// other by the kernel inside the container.

use scriptorium_common::types::{Classification, ExecutionOutcome};

use crate::engine::{ExecutionLimits, RawRun};

pub const TIMEOUT_MESSAGE: &str = "Execution timed out";
pub const MEMORY_MESSAGE: &str = "Memory limit exceeded";
pub const OUTPUT_MESSAGE: &str = "Output limit exceeded";

/// `timeout` exits 124 on TERM; 137/143 show up when the signal lands on the child
const TIMEOUT_EXIT_CODES: [i64; 3] = [124, 137, 143];

pub fn classify(raw: RawRun, limits: &ExecutionLimits) -> ExecutionOutcome {
    let execution_time_ms = raw.elapsed.as_millis() as u64;
    let exit_code = raw.exit_code;

    let outcome = |classification, stdout: String, stderr: String| ExecutionOutcome {
        stdout,
        stderr,
        classification,
        exit_code,
        execution_time_ms,
    };

    if raw.output_overflow {
        return outcome(
            Classification::OutputOverflow,
            String::new(),
            OUTPUT_MESSAGE.to_string(),
        );
    }

    if raw.oom_killed {
        return outcome(
            Classification::MemoryExceeded,
            String::new(),
            MEMORY_MESSAGE.to_string(),
        );
    }

    if timed_out(&raw, limits) {
        return outcome(
            Classification::TimedOut,
            with_timeout_notice(raw.stdout),
            String::new(),
        );
    }

    match exit_code {
        Some(0) => outcome(Classification::Completed, raw.stdout, raw.stderr),
        _ => outcome(Classification::CompileOrRuntimeError, raw.stdout, raw.stderr),
    }
}

fn timed_out(raw: &RawRun, limits: &ExecutionLimits) -> bool {
    if raw.deadline_exceeded {
        return true;
    }
    // A program may exit 124 on its own; only trust the code once the limit elapsed
    matches!(raw.exit_code, Some(code) if TIMEOUT_EXIT_CODES.contains(&code))
        && raw.elapsed >= limits.timeout
}

fn with_timeout_notice(mut stdout: String) -> String {
    if !stdout.is_empty() && !stdout.ends_with('\n') {
        stdout.push('\n');
    }
    stdout.push_str(TIMEOUT_MESSAGE);
    stdout
}

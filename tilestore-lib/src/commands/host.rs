use std::io::Write;

/// Where a command sends its output and how it ends the process.
///
/// Tests substitute a host that captures the streams in memory.
pub trait Host: Send + Sync {
    /// Stream for regular output, stdout for a real process.
    fn output(&mut self) -> impl Write;

    /// Stream for diagnostics, stderr for a real process.
    fn error(&mut self) -> impl Write;

    /// End the process with `code`; a test host records the code and returns.
    fn exit(&mut self, code: i32);
}

/// Host that keeps everything in memory
#[cfg(test)]
pub struct TestHost {
    pub output_buf: Vec<u8>,
    pub error_buf: Vec<u8>,
    pub exit_code: Option<i32>,
}

#[cfg(test)]
impl TestHost {
    pub const fn new() -> Self {
        Self {
            output_buf: Vec::new(),
            error_buf: Vec::new(),
            exit_code: None,
        }
    }

    pub fn output_str(&self) -> String {
        String::from_utf8_lossy(&self.output_buf).into_owned()
    }

    pub fn error_str(&self) -> String {
        String::from_utf8_lossy(&self.error_buf).into_owned()
    }
}

#[cfg(test)]
impl Host for TestHost {
    fn output(&mut self) -> impl Write {
        &mut self.output_buf
    }

    fn error(&mut self) -> impl Write {
        &mut self.error_buf
    }

    fn exit(&mut self, code: i32) {
        self.exit_code = Some(code);
    }
}

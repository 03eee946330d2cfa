//! Argument builder shared by the `ssh` client and `docker run` invocations.

/// Builder for assembling command arguments consistently.
#[derive(Debug, Default)]
pub struct CommandArgsBuilder {
    args: Vec<String>,
}

impl CommandArgsBuilder {
    /// Create a new, empty builder.
    pub fn new() -> Self {
        Self { args: Vec::new() }
    }

    /// Append a raw argument to the builder.
    pub fn push_arg<S: Into<String>>(&mut self, arg: S) {
        self.args.push(arg.into());
    }

    /// Append a flag followed by its value if the value is not empty.
    pub fn push_flag_value(&mut self, flag: &str, value: &str) {
        if value.is_empty() {
            return;
        }
        self.args.push(flag.into());
        self.args.push(value.into());
    }

    /// Append the flag once for each non-empty value in `values`.
    pub fn push_flag_values<S: AsRef<str>>(&mut self, flag: &str, values: &[S]) {
        for value in values {
            self.push_flag_value(flag, value.as_ref());
        }
    }

    /// Return the collected arguments.
    pub fn into_args(self) -> Vec<String> {
        self.args
    }
}

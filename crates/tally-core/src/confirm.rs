use std::io::{self, BufRead, Write};

use tracing::debug;

/// Asks the user to approve a destructive action. `Ok(false)` means cancel.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool>;
}

/// Prompts on stderr and reads one line; anything but `y`/`yes` cancels.
#[derive(Debug)]
pub struct PromptConfirm<R, W> {
    input: R,
    output: W,
}

impl PromptConfirm<io::StdinLock<'static>, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> PromptConfirm<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Confirm for PromptConfirm<R, W> {
    fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool> {
        write!(self.output, "{prompt} [y/N] ")?;
        self.output.flush()?;

        let mut answer = String::new();
        self.input.read_line(&mut answer)?;
        let accepted = matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes");
        debug!(accepted, "confirmation answered");
        Ok(accepted)
    }
}

/// Backs `--yes`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, _prompt: &str) -> anyhow::Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn only_explicit_yes_confirms() {
        let cases = [
            ("y\n", true),
            ("YES\n", true),
            ("n\n", false),
            ("\n", false),
            ("", false),
        ];
        for (input, expected) in cases {
            let mut out = Vec::new();
            let mut prompt = PromptConfirm::new(Cursor::new(input), &mut out);
            assert_eq!(prompt.confirm("Delete?").unwrap(), expected, "input {input:?}");
            assert_eq!(String::from_utf8(out).unwrap(), "Delete? [y/N] ");
        }
    }
}

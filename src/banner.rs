use std::io::{BufRead, Write};

const LOGO: &str = r#"
 __   __                  ____            _           _
 \ \ / /__  _   _ _ __   |  _ \ _ __ ___ (_) ___  ___| |_
  \ V / _ \| | | | '__|  | |_) | '__/ _ \| |/ _ \/ __| __|
   | | (_) | |_| | |     |  __/| | | (_) | |  __/ (__| |_
   |_|\___/ \__,_|_|     |_|   |_|  \___// |\___|\___|\__|
                                        |__/
"#;

pub fn logo() -> &'static str {
    LOGO
}

/// Shows the first-run greeting and waits until the user presses Enter.
pub fn greet<R: BufRead, W: Write>(input: &mut R, output: &mut W, text: &str) -> std::io::Result<()> {
    write!(output, "{text}")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(())
}

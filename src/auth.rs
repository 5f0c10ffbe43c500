use anyhow::{Result, bail};
use std::io::{self, BufRead, IsTerminal};
use zeroize::Zeroizing;

pub const PASSWORD_ENV: &str = "PHANTOM_PASSWORD";

/// Password for unlocking an existing block.
pub fn read_password() -> Result<Zeroizing<String>> {
    if let Some(pw) = from_env_or_pipe()? {
        return Ok(pw);
    }

    let pw = Zeroizing::new(rpassword::prompt_password("Password: ")?);
    if pw.is_empty() {
        bail!("password cannot be empty");
    }
    Ok(pw)
}

/// Password for a new block; asks twice when prompting interactively.
pub fn read_new_password() -> Result<Zeroizing<String>> {
    if let Some(pw) = from_env_or_pipe()? {
        return Ok(pw);
    }

    let pw1 = Zeroizing::new(rpassword::prompt_password("New password: ")?);
    let pw2 = Zeroizing::new(rpassword::prompt_password("Confirm password: ")?);

    if pw1.is_empty() {
        bail!("password cannot be empty");
    }

    if pw1 != pw2 {
        bail!("passwords do not match");
    }

    Ok(pw1)
}

fn from_env_or_pipe() -> Result<Option<Zeroizing<String>>> {
    //  PHANTOM_PASSWORD="supersecret" phantom encode "text"
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            return Ok(Some(Zeroizing::new(pw)));
        }
    }

    //  printf "%s\n" "$PW" | phantom decode --input block.txt
    if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().lock().read_line(&mut buf)?;
        trim_newline(&mut buf);

        if buf.is_empty() {
            bail!("password cannot be empty");
        }
        return Ok(Some(buf));
    }

    Ok(None)
}

fn trim_newline(s: &mut String) {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
}

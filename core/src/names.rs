//! Script name sanitisation
//!
//! Script names double as registry keys and as file names inside the scripts
//! directory, so every operation validates them up front. A name that would
//! change under sanitisation is rejected rather than normalised.

use crate::{CoreError, Result};

/// Longest accepted script name in bytes
pub const MAX_NAME_LEN: usize = 255;

/// Reduce an arbitrary file name to a safe, flat ASCII name.
///
/// Non-ASCII characters are dropped without Unicode decomposition, so `ü`
/// disappears instead of becoming `u`. Path separators become spaces, runs of
/// whitespace collapse to a single `_`, anything outside `[A-Za-z0-9_.-]` is
/// removed and leading/trailing `.`/`_` are stripped. The result may be empty.
pub fn secure_filename(name: &str) -> String {
    let flattened: String = name
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// Accept `name` only if it is already in sanitised form
pub fn validate_script_name(name: &str) -> Result<&str> {
    if name.is_empty() {
        return Err(CoreError::InvalidName("name cannot be empty".to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(CoreError::InvalidName(format!(
            "name exceeds {} bytes",
            MAX_NAME_LEN
        )));
    }
    if secure_filename(name) != name {
        return Err(CoreError::InvalidName(format!("'{}' is not a safe file name", name)));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_filename_normalisation() {
        assert_eq!(secure_filename("My cool movie.mov"), "My_cool_movie.mov");
        assert_eq!(secure_filename("../../../etc/passwd"), "etc_passwd");
        // Accented letters are dropped, not folded to ASCII
        assert_eq!(secure_filename("i contain cool \u{fc}ml\u{e4}uts.txt"), "i_contain_cool_mluts.txt");
        assert_eq!(secure_filename("..."), "");
        assert_eq!(secure_filename("_hidden_"), "hidden");
    }

    #[test]
    fn test_accepts_safe_names() {
        for name in ["probe.sh", "sploit_1.py", "a-b.c", "X"] {
            assert_eq!(validate_script_name(name).unwrap(), name);
        }
    }

    #[test]
    fn test_rejects_unsafe_names() {
        for name in [
            "",
            "../probe.sh",
            "dir/probe.sh",
            ".hidden",
            "with space.py",
            "semi;colon.sh",
            "trailing.",
            "nul\0byte",
        ] {
            match validate_script_name(name) {
                Err(CoreError::InvalidName(_)) => {}
                other => panic!("expected InvalidName for {:?}, got {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_rejects_overlong_names() {
        let name = "a".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(
            validate_script_name(&name),
            Err(CoreError::InvalidName(_))
        ));
    }
}

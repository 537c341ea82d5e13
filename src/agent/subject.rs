/// Environment variables consulted when the login name is unavailable.
const SUBJECT_ENV_VARS: [&str; 2] = ["USERNAME", "USER"];

/// Picks the subject to monitor: explicit argument, then the session's login
/// name, then the environment, then `placeholder`.
pub fn resolve_subject(arg: Option<&str>, placeholder: &str) -> String {
    resolve_subject_with(
        arg,
        || whoami::fallible::username().ok(),
        |key| std::env::var(key).ok(),
        placeholder,
    )
}

pub fn resolve_subject_with(
    arg: Option<&str>,
    login_name: impl FnOnce() -> Option<String>,
    env: impl Fn(&str) -> Option<String>,
    placeholder: &str,
) -> String {
    let non_blank = |s: String| {
        let trimmed = s.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    };

    arg.map(str::to_string)
        .and_then(non_blank)
        .or_else(|| login_name().and_then(non_blank))
        .or_else(|| {
            SUBJECT_ENV_VARS
                .iter()
                .find_map(|key| env(key).and_then(non_blank))
        })
        .unwrap_or_else(|| placeholder.to_string())
}

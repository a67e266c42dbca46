//! `@name` mention extraction for topic and reply bodies.

/// Extract mentioned usernames from `content`, in order of first appearance.
///
/// Content is split on whitespace. A token counts when it is longer than one
/// character, contains `@` and does not end with `@`; the name is whatever
/// follows the last `@` in the token. Duplicates are dropped.
pub fn mentioned_names(content: &str) -> Vec<String> {
    if !content.contains('@') {
        return Vec::new();
    }

    let mut names: Vec<String> = Vec::new();
    for token in content.split_whitespace() {
        if token.chars().count() <= 1 || token.ends_with('@') {
            continue;
        }
        let Some((_, name)) = token.rsplit_once('@') else {
            continue;
        };
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    }
    names
}

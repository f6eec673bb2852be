//! Path joining for engines that build remote paths piece by piece.

/// Join path pieces the way URL paths join.
///
/// Empty pieces are ignored, `.` and `..` are resolved lexically and repeated
/// slashes collapse. `..` never climbs above the start, so a relative join
/// that cancels out is empty. A leading `/` is kept only when the first piece
/// is absolute, and a trailing `/` only when the last piece ends with one.
pub fn join<S: AsRef<str>>(parts: &[S]) -> String {
    let Some(first) = parts.first() else {
        return String::new();
    };
    let absolute = first.as_ref().starts_with('/');
    let trailing = parts.last().is_some_and(|last| last.as_ref().ends_with('/'));

    let mut segments: Vec<&str> = Vec::new();
    for segment in parts.iter().flat_map(|part| part.as_ref().split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    let mut joined = segments.join("/");
    if absolute {
        joined.insert(0, '/');
    }
    if trailing && !joined.is_empty() && !joined.ends_with('/') {
        joined.push('/');
    }
    joined
}

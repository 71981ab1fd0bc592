//! Dense CSV helpers

/// Check if a dense CSV line looks like a header
///
/// A line is a header when most of its feature fields fail to parse as
/// numbers. The label column of a labeled file is ignored.
pub fn is_header_line(line: &str, labeled: bool) -> bool {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let features = if labeled { &fields[1..] } else { &fields[..] };
    if features.is_empty() {
        return false;
    }

    let non_numeric = features
        .iter()
        .filter(|field| field.parse::<f64>().is_err())
        .count();
    2 * non_numeric > features.len()
}

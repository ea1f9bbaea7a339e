// src/utils/url.rs

//! URL manipulation utilities.

/// Resolve a possibly relative image path against a CDN root.
///
/// Upstream image fields are sometimes absolute URLs and sometimes paths
/// relative to a source-specific CDN root; downstream consumers always get
/// one absolute form.
///
/// # Examples
/// ```
/// use cinesync::utils::url::resolve_image;
///
/// assert_eq!(
///     resolve_image("https://img.example.com/uploads", "poster.jpg"),
///     "https://img.example.com/uploads/poster.jpg"
/// );
/// assert_eq!(
///     resolve_image("https://img.example.com/uploads", "https://other.com/p.jpg"),
///     "https://other.com/p.jpg"
/// );
/// ```
pub fn resolve_image(root: &str, path: &str) -> String {
    // Already absolute
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }

    format!(
        "{}/{}",
        root.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

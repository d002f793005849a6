use std::cmp::Ordering;
use std::fmt::Write;
use std::io;
use std::path::{Component, Path, PathBuf};

/// One row of a directory index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/**
    Map a request path onto a location inside `root`.

    Returns `None` for anything that could step outside the root: parent
    components, absolute segments and platform prefixes.
*/
pub fn resolve(root: &Path, request_path: &str) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();

    for component in Path::new(request_path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    Some(resolved)
}

/// Read a directory, directories first, then by name.
pub async fn read_listing(dir: &Path) -> io::Result<Vec<Listing>> {
    let mut entries = Vec::new();
    let mut reader = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = reader.next_entry().await? {
        // Follows symlinks; dangling links are skipped.
        let Ok(metadata) = tokio::fs::metadata(entry.path()).await else {
            continue;
        };

        entries.push(Listing {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: metadata.is_dir(),
            size: metadata.len(),
        });
    }

    entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.name.cmp(&b.name),
    });

    Ok(entries)
}

/// Render the HTML index page for a directory at `request_path`.
pub fn render_index(request_path: &str, entries: &[Listing]) -> String {
    let trimmed = request_path.trim_matches('/');
    let title = if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    };
    let title = escape_html(&title);

    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Index of {title}</title>\n</head>\n<body>\n\
         <h1>Index of {title}</h1>\n<table>\n"
    );

    if !trimmed.is_empty() {
        html.push_str("<tr><td><a href=\"../\">../</a></td><td></td></tr>\n");
    }

    for entry in entries {
        let suffix = if entry.is_dir { "/" } else { "" };
        let size = if entry.is_dir {
            "-".to_string()
        } else {
            format_size(entry.size)
        };
        let _ = writeln!(
            html,
            "<tr><td><a href=\"{href}{suffix}\">{name}{suffix}</a></td><td>{size}</td></tr>",
            href = escape_html(&encode_href(&entry.name)),
            name = escape_html(&entry.name),
        );
    }

    html.push_str("</table>\n</body>\n</html>\n");
    html
}

/// Human-readable size with binary units.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Percent-encode a file name for use as a relative link.
fn encode_href(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_inside_root() {
        let root = Path::new("/rec");
        assert_eq!(resolve(root, ""), Some(PathBuf::from("/rec")));
        assert_eq!(resolve(root, "/"), Some(PathBuf::from("/rec")));
        assert_eq!(
            resolve(root, "a.ts"),
            Some(PathBuf::from("/rec/a.ts"))
        );
        assert_eq!(
            resolve(root, "sub/./b.jpg"),
            Some(PathBuf::from("/rec/sub/b.jpg"))
        );
        assert_eq!(
            resolve(root, "sub//b.jpg"),
            Some(PathBuf::from("/rec/sub/b.jpg"))
        );
    }

    #[test]
    fn test_resolve_rejects_escapes() {
        let root = Path::new("/rec");
        assert_eq!(resolve(root, ".."), None);
        assert_eq!(resolve(root, "../etc/passwd"), None);
        assert_eq!(resolve(root, "sub/../../etc"), None);
    }

    #[tokio::test]
    async fn test_read_listing_orders_dirs_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.ts"), b"12345").unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"1").unwrap();
        std::fs::create_dir(dir.path().join("z-archive")).unwrap();

        let listing = read_listing(dir.path()).await.unwrap();
        let names: Vec<&str> = listing.iter().map(|l| l.name.as_str()).collect();

        assert_eq!(names, ["z-archive", "a.jpg", "b.ts"]);
        assert!(listing[0].is_dir);
        assert_eq!(listing[2].size, 5);
    }

    #[test]
    fn test_render_index() {
        let entries = vec![
            Listing {
                name: "old".to_string(),
                is_dir: true,
                size: 4096,
            },
            Listing {
                name: "a b&c.ts".to_string(),
                is_dir: false,
                size: 2048,
            },
        ];

        let root = render_index("", &entries);
        assert!(root.contains("<title>Index of /</title>"));
        assert!(!root.contains("../"));
        assert!(root.contains("<a href=\"old/\">old/</a></td><td>-</td>"));
        assert!(root.contains("<a href=\"a%20b%26c.ts\">a b&amp;c.ts</a></td><td>2.0 KiB</td>"));

        let nested = render_index("old/", &[]);
        assert!(nested.contains("<h1>Index of /old/</h1>"));
        assert!(nested.contains("<a href=\"../\">../</a>"));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KiB");
        assert_eq!(format_size(5 * 1024 * 1024 * 1024), "5.0 GiB");
    }
}

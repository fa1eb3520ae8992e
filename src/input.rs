use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};

/// A source of hosts: a file or stdin.
#[derive(Default, Clone, Debug)]
pub enum FileOrStdin {
    /// Hosts listed in a file.
    File(Utf8PathBuf),
    /// Hosts read from stdin.
    #[default]
    Stdin,
}

impl fmt::Display for FileOrStdin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOrStdin::File(path) => write!(f, "{}", path),
            FileOrStdin::Stdin => write!(f, "<stdin>"),
        }
    }
}

impl FileOrStdin {
    /// Create a new FileOrStdin from a path.
    ///
    /// If the path is "-", stdin is used.
    pub fn from_path(path: Utf8PathBuf) -> Self {
        if path.as_str() == "-" {
            FileOrStdin::Stdin
        } else {
            FileOrStdin::File(path)
        }
    }

    /// Open the input source as a reader.
    pub fn reader(&self) -> Result<InputReader> {
        match self {
            FileOrStdin::File(path) => {
                let file =
                    File::open(path).with_context(|| format!("failed to open file: {}", path))?;
                Ok(InputReader::File(BufReader::new(file)))
            }
            FileOrStdin::Stdin => Ok(InputReader::Stdin(BufReader::new(io::stdin()))),
        }
    }
}

/// A reader for input from either a file or stdin.
pub enum InputReader {
    File(BufReader<File>),
    Stdin(BufReader<io::Stdin>),
}

impl InputReader {
    /// Call `f` with every host in the input, one per line.
    ///
    /// Surrounding whitespace is trimmed; blank lines and lines starting
    /// with `#` are skipped. Lines that are not valid UTF-8 are decoded
    /// lossily.
    pub fn for_each_host<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&str) -> Result<()>,
    {
        let mut buf = Vec::with_capacity(256);
        loop {
            buf.clear();
            let n = match self {
                InputReader::File(ref mut rdr) => rdr.read_until(b'\n', &mut buf),
                InputReader::Stdin(ref mut rdr) => rdr.read_until(b'\n', &mut buf),
            };
            let n = n.context("failed to read line")?;
            if n == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            let host = line.trim();
            if host.is_empty() || host.starts_with('#') {
                continue;
            }
            f(host)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn dash_is_stdin() {
        assert!(matches!(
            FileOrStdin::from_path(Utf8PathBuf::from("-")),
            FileOrStdin::Stdin
        ));
        assert_eq!(FileOrStdin::Stdin.to_string(), "<stdin>");
    }

    #[test]
    fn hosts_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "# resolvers\n8.8.8.8\n\n  1.1.1.1  \r\nexample.com").unwrap();
        let path = Utf8PathBuf::from_path_buf(file.path().to_path_buf()).unwrap();

        let mut hosts = Vec::new();
        FileOrStdin::from_path(path)
            .reader()
            .unwrap()
            .for_each_host(|h| {
                hosts.push(h.to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(hosts, vec!["8.8.8.8", "1.1.1.1", "example.com"]);
    }

    #[test]
    fn missing_file() {
        let err = FileOrStdin::from_path(Utf8PathBuf::from("/nonexistent/hosts.txt"))
            .reader()
            .err()
            .unwrap();
        assert!(err.to_string().contains("failed to open file"));
    }
}

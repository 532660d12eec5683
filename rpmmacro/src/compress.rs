use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Compression format detected from a file's leading magic bytes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    /// Plain file
    None,
    /// gzip and the other `\037`-prefixed formats (pack, lzh, compress)
    Gzip,
    /// bzip2
    Bzip2,
    /// pkzip
    Zip,
}

impl Compression {
    /// Classify the first bytes of a file
    #[must_use]
    pub fn from_magic(magic: &[u8]) -> Self {
        match magic {
            [b'B', b'Z', ..] => Compression::Bzip2,
            [b'P', b'K', 0o003, 0o004, ..] => Compression::Zip,
            [0o037, 0o213 | 0o236 | 0o036 | 0o240 | 0o235, ..] => Compression::Gzip,
            _ => Compression::None,
        }
    }

    /// The macro invocation that decompresses `file` to stdout
    #[must_use]
    pub fn command(self, file: &str) -> String {
        match self {
            Compression::None => format!("%_cat {file}"),
            Compression::Gzip => format!("%_gzip -dc {file}"),
            Compression::Bzip2 => format!("%_bzip2 {file}"),
            Compression::Zip => format!("%_unzip {file}"),
        }
    }
}

/// Sniff `path`; unreadable or short files are treated as uncompressed
#[must_use]
pub fn detect_compression(path: &Path) -> Compression {
    let mut magic = [0u8; 4];
    let read = File::open(path).and_then(|mut f| {
        let mut n = 0;
        while n < magic.len() {
            match f.read(&mut magic[n..])? {
                0 => break,
                k => n += k,
            }
        }
        Ok(n)
    });
    match read {
        Ok(n) if n == magic.len() => Compression::from_magic(&magic),
        Ok(_) => {
            tracing::warn!(path = %path.display(), "File is smaller than {} bytes", magic.len());
            Compression::None
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "cannot sniff compression");
            Compression::None
        }
    }
}

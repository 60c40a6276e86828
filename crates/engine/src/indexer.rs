//! Indexer subprocess control.
//!
//! `recollindex -c <confdir>` updates the on-disk index and exits; there is
//! no progress reporting, only a status code. The handle exposes a
//! non-blocking poll so the coordinator can keep answering status queries
//! while indexing proceeds.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, ExitStatus};

use tracing::info;

use crate::EngineError;

pub struct IndexerHandle {
    child: Child,
}

impl IndexerHandle {
    /// Bootstrap the engine configuration if needed and start the indexer.
    pub fn start(confdir: &Path, topdirs: &[String]) -> Result<Self, EngineError> {
        write_engine_config(confdir, topdirs)?;
        info!("starting recollindex in {}", confdir.display());
        let child = Command::new("recollindex")
            .arg("-c")
            .arg(confdir)
            .env("HOME", confdir)
            .spawn()?;
        Ok(Self { child })
    }

    /// Non-blocking completion check: `None` while still running.
    pub fn poll(&mut self) -> Result<Option<ExitStatus>, EngineError> {
        Ok(self.child.try_wait()?)
    }
}

/// Create `<confdir>/recoll.conf` with the configured top directories and
/// the fixed indexing parameters this catalog relies on. An existing
/// `recoll.conf.user` file is appended verbatim so local overrides survive
/// regeneration.
pub fn write_engine_config(confdir: &Path, topdirs: &[String]) -> Result<(), EngineError> {
    if !confdir.is_dir() {
        fs::create_dir_all(confdir)?;
    }

    let mut topdirs_line = String::new();
    for dir in topdirs {
        if !topdirs_line.is_empty() {
            topdirs_line.push(' ');
        }
        if dir.contains(' ') {
            topdirs_line.push('"');
            topdirs_line.push_str(dir);
            topdirs_line.push('"');
        } else {
            topdirs_line.push_str(dir);
        }
    }

    let user_conf = confdir.join("recoll.conf.user");
    let user_data = if user_conf.exists() {
        fs::read_to_string(&user_conf)?
    } else {
        String::new()
    };

    let path = confdir.join("recoll.conf");
    let mut f = fs::File::create(&path)?;
    writeln!(f, "topdirs = {}", topdirs_line)?;
    writeln!(f, "idxabsmlen = 0")?;
    writeln!(f, "loglevel = 2")?;
    writeln!(f, "noaspell = 1")?;
    writeln!(f, "testmodifusemtime = 1")?;
    writeln!(f, "idxmetastoredlen = 20000")?;
    if !user_data.is_empty() {
        f.write_all(user_data.as_bytes())?;
    }
    Ok(())
}

//! Spawn schedule file format
//!
//! A schedule file is a JSON array of `{"lat": .., "lng": .., "time": ..}`
//! records. Files written by `hexsweep plan` also carry the assigned
//! `worker` index; it is ignored when the file is read back as input.

use super::{SpawnPoint, HOUR_SECS};
use crate::error::{ScheduleError, ScheduleResult};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Read and validate a schedule file
pub fn load_schedule(path: &Path) -> ScheduleResult<Vec<SpawnPoint>> {
    let file = File::open(path).map_err(|source| ScheduleError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let spawns: Vec<SpawnPoint> =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| ScheduleError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    for sp in &spawns {
        if !sp.time.is_finite() || sp.time < 0.0 || sp.time >= HOUR_SECS {
            return Err(ScheduleError::InvalidTime { time: sp.time });
        }
    }

    Ok(spawns)
}

/// Write a schedule file
pub fn save_schedule(path: &Path, spawns: &[SpawnPoint]) -> ScheduleResult<()> {
    let io_err = |source| ScheduleError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, spawns).map_err(|source| ScheduleError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(io_err)?;
    Ok(())
}

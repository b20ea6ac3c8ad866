use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::limits::MAX_WAL_FRAME_LEN;
use crate::model::Event;

/// Bytes of framing around each payload: length prefix + CRC.
const FRAME_OVERHEAD: u64 = 8;

/// Encode a single event to [len][bincode][crc32] format.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if payload.len() > MAX_WAL_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("WAL frame of {} bytes exceeds {MAX_WAL_FRAME_LEN}", payload.len()),
        ));
    }
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Read one frame. `Ok(None)` at a clean end of file or at a torn/corrupt frame.
fn read_frame(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_WAL_FRAME_LEN {
        return Ok(None);
    }

    let mut payload = vec![0u8; len];
    let mut crc_buf = [0u8; 4];
    for buf in [&mut payload[..], &mut crc_buf[..]] {
        match reader.read_exact(buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    match bincode::deserialize::<Event>(&payload) {
        Ok(event) => Ok(Some((event, len as u64 + FRAME_OVERHEAD))),
        Err(_) => Ok(None),
    }
}

/// Result of reading a log from disk.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    /// Length of the intact prefix of the file.
    pub valid_len: u64,
    /// True when bytes after `valid_len` were ignored.
    pub discarded_tail: bool,
}

/// Append-only Write-Ahead Log.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - A torn or corrupt tail ends replay and is cut off when the log is reopened.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
    /// File length as of the last successful fsync.
    synced_len: u64,
    synced_appends: u64,
}

impl Wal {
    /// Open (or create) the WAL file at `path` for appending.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let synced_len = file.metadata()?.len();
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
            synced_len,
            synced_appends: 0,
        })
    }

    /// Reopen a replayed log for appending. A discarded tail is cut off first
    /// so new entries never land behind bytes that replay stops at. Replayed
    /// events count towards the compaction threshold.
    pub fn open_after_replay(path: &Path, replay: &Replay) -> io::Result<Self> {
        if replay.discarded_tail {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(replay.valid_len)?;
            file.sync_all()?;
        }
        let mut wal = Self::open(path)?;
        wal.appends_since_compact = replay.events.len() as u64;
        wal.synced_appends = wal.appends_since_compact;
        Ok(wal)
    }

    /// Append a single event and fsync. Production code batches through
    /// `append_buffered` + `flush_sync` instead.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Append to the BufWriter without flushing or syncing.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_event(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Flush the BufWriter and fsync the underlying file.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.synced_len = self.writer.get_ref().metadata()?.len();
        self.synced_appends = self.appends_since_compact;
        Ok(())
    }

    /// Drop everything appended since the last successful `flush_sync`, both
    /// the bytes still buffered and any already written to the file.
    pub fn discard_unsynced(&mut self) -> io::Result<()> {
        let fresh = BufWriter::new(OpenOptions::new().append(true).open(&self.path)?);
        let stale = std::mem::replace(&mut self.writer, fresh);
        // into_parts hands back the file without flushing the buffer.
        let (file, _unwritten) = stale.into_parts();
        file.set_len(self.synced_len)?;
        file.sync_all()?;
        self.appends_since_compact = self.synced_appends;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Write the compacted log beside the live one and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let file = File::create(compact_path(path))?;
        let mut writer = BufWriter::new(file);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the compacted file over the live log and reopen it.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(compact_path(&self.path), &self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.synced_len = file.metadata()?.len();
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        self.synced_appends = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    /// Read every intact event from disk. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut replay = Replay::default();

        while let Some((event, frame_len)) = read_frame(&mut reader)? {
            replay.events.push(event);
            replay.valid_len += frame_len;
        }
        replay.discarded_tail = replay.valid_len < file_len;
        if replay.discarded_tail {
            tracing::warn!(
                path = %path.display(),
                discarded = file_len - replay.valid_len,
                "WAL has a torn or corrupt tail; ignoring it"
            );
        }
        Ok(replay)
    }
}

fn compact_path(path: &Path) -> PathBuf {
    path.with_extension("wal.tmp")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("turnos_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn saved(owner: ScheduleOwner) -> Event {
        Event::ScheduleSaved {
            owner,
            schedule: WeeklySchedule::new(vec![DayPlan::open(
                0,
                TimeRange::new(
                    chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                    chrono::NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
                ),
            )]),
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let owner = ScheduleOwner::Business(Ulid::new());
        let events = vec![saved(owner), Event::ScheduleDeleted { owner }];

        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
        }

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, events);
        assert!(!replay.discarded_tail);
        assert_eq!(replay.valid_len, fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn replay_nonexistent_file() {
        let path = tmp_path("nonexistent.wal");
        let replay = Wal::replay(&path).unwrap();
        assert!(replay.events.is_empty());
        assert_eq!(replay.valid_len, 0);
    }

    #[test]
    fn torn_tail_is_discarded_and_truncated_on_reopen() {
        let path = tmp_path("torn_tail.wal");
        let owner = ScheduleOwner::Employee(Ulid::new());
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&saved(owner)).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[7u8; 6]).unwrap(); // partial length + some bytes
        }

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events.len(), 1);
        assert!(replay.discarded_tail);

        // Appends after reopening must be readable.
        let next = Event::ScheduleDeleted { owner };
        {
            let mut wal = Wal::open_after_replay(&path, &replay).unwrap();
            assert_eq!(wal.appends_since_compact(), 1);
            wal.append(&next).unwrap();
        }
        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![saved(owner), next]);
        assert!(!replay.discarded_tail);
    }

    #[test]
    fn replay_stops_at_bad_crc() {
        let path = tmp_path("corrupt_crc.wal");
        let event = Event::ScheduleDeleted {
            owner: ScheduleOwner::Business(Ulid::new()),
        };
        {
            let payload = bincode::serialize(&event).unwrap();
            let mut f = File::create(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEADBEEFu32.to_le_bytes()).unwrap();
        }

        let replay = Wal::replay(&path).unwrap();
        assert!(replay.events.is_empty());
        assert!(replay.discarded_tail);
    }

    #[test]
    fn oversized_length_prefix_is_a_corrupt_tail() {
        let path = tmp_path("oversized_len.wal");
        let owner = ScheduleOwner::Business(Ulid::new());
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&saved(owner)).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&u32::MAX.to_le_bytes()).unwrap();
            f.write_all(&[0u8; 16]).unwrap();
        }

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![saved(owner)]);
        assert!(replay.discarded_tail);
    }

    #[test]
    fn unsynced_appends_are_discarded() {
        let path = tmp_path("discard_unsynced.wal");
        let owner = ScheduleOwner::Business(Ulid::new());
        let mut wal = Wal::open(&path).unwrap();
        wal.append(&saved(owner)).unwrap();
        let synced = fs::metadata(&path).unwrap().len();

        // Written to the file but never fsynced, plus one still buffered.
        wal.append_buffered(&Event::ScheduleDeleted { owner }).unwrap();
        wal.writer.flush().unwrap();
        wal.append_buffered(&saved(owner)).unwrap();
        assert!(fs::metadata(&path).unwrap().len() > synced);
        assert_eq!(wal.appends_since_compact(), 3);

        wal.discard_unsynced().unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), synced);
        assert_eq!(wal.appends_since_compact(), 1);

        let next = Event::ScheduleDeleted { owner };
        wal.append(&next).unwrap();
        drop(wal);
        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![saved(owner), next]);
        assert!(!replay.discarded_tail);
    }

    #[test]
    fn compact_then_append() {
        let path = tmp_path("compact_append.wal");
        let owner = ScheduleOwner::Business(Ulid::new());
        let mut wal = Wal::open(&path).unwrap();
        for _ in 0..10 {
            wal.append(&saved(owner)).unwrap();
        }
        let before = fs::metadata(&path).unwrap().len();

        wal.compact(&[saved(owner)]).unwrap();
        assert_eq!(wal.appends_since_compact(), 0);
        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted WAL should be smaller: {after} < {before}");

        wal.append(&Event::ScheduleDeleted { owner }).unwrap();
        drop(wal);

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![saved(owner), Event::ScheduleDeleted { owner }]);
    }

    #[test]
    fn append_buffered_then_flush_sync() {
        let path = tmp_path("buffered_flush.wal");
        let events: Vec<Event> = (0..5)
            .map(|_| saved(ScheduleOwner::Business(Ulid::new())))
            .collect();

        let mut wal = Wal::open(&path).unwrap();
        for e in &events {
            wal.append_buffered(e).unwrap();
        }
        assert_eq!(wal.appends_since_compact(), 5);
        wal.flush_sync().unwrap();
        drop(wal);

        assert_eq!(Wal::replay(&path).unwrap().events, events);
    }
}

//! Mission recorder - buffers encoded blocks and writes them to a mission
//! file in 512-byte units, keeping the superblock flight directory current.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, info};

use borealis_core::format::{spacer_block, spacer_gap, Flight, SuperBlock, BLOCK_SIZE};

/// Writes one recording session into a mission file.
///
/// Runs inline in the engine; every flush is bounded by the buffered
/// chunk size so no append stalls the orchestrator for long.
pub struct MissionRecorder<W: Write + Seek> {
    writer: W,
    superblock: SuperBlock,
    buffer: Vec<u8>,
}

impl MissionRecorder<File> {
    /// Create a new mission file and write its initial superblock with
    /// one empty flight starting at file block 1.
    pub fn create(path: &Path, epoch: u32) -> io::Result<Self> {
        info!("Starting recording to: {}", path.display());
        let file = File::create(path)?;
        Self::new(file, epoch)
    }
}

impl<W: Write + Seek> MissionRecorder<W> {
    pub fn new(writer: W, epoch: u32) -> io::Result<Self> {
        let mut superblock = SuperBlock::default();
        superblock
            .add_flight(Flight {
                first_block: 1,
                num_blocks: 0,
                timestamp: Some(epoch),
            })
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        let mut recorder = Self {
            writer,
            superblock,
            buffer: Vec::new(),
        };
        recorder.writer.write_all(&recorder.superblock.to_bytes())?;
        recorder.writer.flush()?;
        Ok(recorder)
    }

    /// Buffer encoded block bytes, flushing whole 512-byte chunks as they
    /// accumulate. The remainder stays buffered for the next append.
    pub fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.buffer.extend_from_slice(bytes);
        if self.buffer.len() >= BLOCK_SIZE {
            let n = self.buffer.len() / BLOCK_SIZE * BLOCK_SIZE;
            let chunk: Vec<u8> = self.buffer.drain(..n).collect();
            self.commit(&chunk)?;
        }
        Ok(())
    }

    /// Flush whatever is still buffered, pad the final write to a block
    /// boundary with a spacer, and close out the session.
    pub fn stop(mut self) -> io::Result<()> {
        let mut tail = std::mem::take(&mut self.buffer);
        if !tail.is_empty() {
            let gap = spacer_gap(tail.len());
            if gap > 0 {
                tail.extend_from_slice(&spacer_block(gap));
            }
            self.commit(&tail)?;
        }
        let blocks = self.num_blocks();
        self.writer.flush()?;
        info!("Recording stopped after {} blocks", blocks);
        Ok(())
    }

    /// Number of 512-byte blocks committed so far, spacers included
    pub fn num_blocks(&self) -> u32 {
        self.superblock
            .flights
            .last()
            .map(|f| f.num_blocks)
            .unwrap_or(0)
    }

    fn commit(&mut self, chunk: &[u8]) -> io::Result<()> {
        debug_assert_eq!(chunk.len() % BLOCK_SIZE, 0);
        if let Some(flight) = self.superblock.flights.last_mut() {
            flight.num_blocks += (chunk.len() / BLOCK_SIZE) as u32;
        }
        // The directory claims the new blocks before they are appended;
        // an interruption between these two writes leaves the index
        // overstating the data present.
        self.writer.seek(SeekFrom::Start(0))?;
        self.writer.write_all(&self.superblock.to_bytes())?;
        self.writer.seek(SeekFrom::End(0))?;
        self.writer.write_all(chunk)?;
        self.writer.flush()?;
        debug!(
            "Committed {} bytes, flight now {} blocks",
            chunk.len(),
            self.num_blocks()
        );
        Ok(())
    }
}

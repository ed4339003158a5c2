//! The producer side of the block pipeline.
//!
//! One thread owns the input file and the byte-to-code-unit converter. The
//! consumer sends indices of blocks that are free to overwrite through the
//! `free` channel; the reader fills each one in circular order and answers
//! with a [`FilledBlock`] through the `filled` channel. Ownership of the
//! cells of a block travels with these messages, which is the entire
//! synchronization story — no mutex, no flags shared between threads.
//!
//! End of stream appends the sentinel code unit and marks the final block,
//! recording how many of its cells are meaningful. A session with zero
//! input code units fails as empty input before any block is delivered.
//! Cancellation is channel disconnection: the reader observes it on the
//! next send or receive and exits.

use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, info};

use crate::convert::{ConvertError, Converter, InputEncoding};
use crate::unit::CodeUnit;
use crate::window::{Cells, Geometry};

#[derive(Debug)]
pub enum ReadError {
    Io(std::io::Error),
    Convert(ConvertError),
    EmptyInput,
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::Io(e) => write!(f, "read failed: {}", e),
            ReadError::Convert(e) => write!(f, "conversion failed: {}", e),
            ReadError::EmptyInput => write!(f, "input is empty"),
        }
    }
}

impl std::error::Error for ReadError {}

impl From<std::io::Error> for ReadError {
    fn from(e: std::io::Error) -> Self {
        ReadError::Io(e)
    }
}

impl From<ConvertError> for ReadError {
    fn from(e: ConvertError) -> Self {
        ReadError::Convert(e)
    }
}

/// Handshake record for one delivered block.
#[derive(Debug, Clone, Copy)]
pub struct FilledBlock {
    /// Circular block index.
    pub index: u32,
    /// Valid code units in the block; short only in the final block.
    pub units: u32,
    /// Set on the final block of the stream.
    pub last: bool,
}

pub struct Reader {
    free: Option<Sender<u32>>,
    filled: Option<Receiver<Result<FilledBlock, ReadError>>>,
    thread: Option<JoinHandle<()>>,
}

impl Reader {
    /// Open the input and spawn the producer thread. All `sw_blocks` block
    /// indices start out free.
    pub fn spawn<C: CodeUnit>(
        path: &Path,
        encoding: InputEncoding,
        cells: Arc<Cells<C>>,
        geometry: Geometry,
    ) -> Result<Reader, ReadError> {
        let file = File::open(path)?;
        let blocks = geometry.sw_blocks as usize;
        let (free_tx, free_rx) = bounded::<u32>(blocks);
        let (filled_tx, filled_rx) = bounded::<Result<FilledBlock, ReadError>>(blocks);
        for block in 0..geometry.sw_blocks {
            free_tx.send(block).expect("fresh channel");
        }
        let thread = std::thread::Builder::new()
            .name("slidetree-reader".into())
            .spawn(move || produce::<C>(file, encoding, cells, geometry, free_rx, filled_tx))
            .map_err(ReadError::Io)?;
        Ok(Reader {
            free: Some(free_tx),
            filled: Some(filled_rx),
            thread: Some(thread),
        })
    }

    /// Next block in circular order; `Err` means the reader is gone.
    pub fn recv(&self) -> Result<FilledBlock, ReadError> {
        match self.filled.as_ref().expect("reader not shut down").recv() {
            Ok(result) => result,
            Err(_) => Err(ReadError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "reader thread exited unexpectedly",
            ))),
        }
    }

    /// Hand a recycled block back to the reader. Failure is fine: after
    /// end of stream the reader is no longer listening.
    pub fn release(&self, block: u32) {
        if let Some(free) = &self.free {
            let _ = free.send(block);
        }
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        // Closing both channels cancels the reader; then wait for it so no
        // resource outlives the session.
        self.free.take();
        self.filled.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn produce<C: CodeUnit>(
    mut file: File,
    encoding: InputEncoding,
    cells: Arc<Cells<C>>,
    geometry: Geometry,
    free: Receiver<u32>,
    filled: Sender<Result<FilledBlock, ReadError>>,
) {
    let mut converter = Converter::<C>::new(encoding);
    let chunk = (geometry.block_size as usize * C::WIDTH).clamp(4096, 1 << 22);
    let mut inbuf = vec![0u8; chunk];
    let mut pending: VecDeque<C> = VecDeque::new();
    let mut fresh: Vec<C> = Vec::new();
    let mut input_units: u64 = 0;
    let mut eof = false;

    loop {
        let Ok(block) = free.recv() else {
            debug!("reader cancelled");
            return;
        };
        let first = geometry.block_first_cell(block);
        let mut units: u32 = 0;
        while units < geometry.block_size {
            if let Some(unit) = pending.pop_front() {
                unsafe { cells.write(first + units, unit) };
                units += 1;
                continue;
            }
            if eof {
                break;
            }
            match file.read(&mut inbuf) {
                Ok(0) => {
                    match converter.finish() {
                        Ok(sentinel) => pending.push_back(sentinel),
                        Err(e) => {
                            let _ = filled.send(Err(e.into()));
                            return;
                        }
                    }
                    eof = true;
                    if input_units == 0 {
                        let _ = filled.send(Err(ReadError::EmptyInput));
                        return;
                    }
                    info!("input exhausted after {} code units", input_units);
                }
                Ok(n) => {
                    fresh.clear();
                    if let Err(e) = converter.convert(&inbuf[..n], &mut fresh) {
                        let _ = filled.send(Err(e.into()));
                        return;
                    }
                    input_units += fresh.len() as u64;
                    pending.extend(fresh.iter().copied());
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    let _ = filled.send(Err(e.into()));
                    return;
                }
            }
        }
        let last = eof && pending.is_empty();
        debug!("block {} filled with {} units (last: {})", block, units, last);
        if filled
            .send(Ok(FilledBlock {
                index: block,
                units,
                last,
            }))
            .is_err()
        {
            return;
        }
        if last {
            return;
        }
    }
}

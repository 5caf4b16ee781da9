use log::warn;
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// a byte-at-a-time serial line
pub trait Serial {
    /// next received byte, if one has arrived
    fn read_byte(&mut self) -> Option<u8>;

    fn write_byte(&mut self, byte: u8);

    /// true once nothing more will ever arrive
    fn input_closed(&self) -> bool {
        false
    }

    fn write_str(&mut self, s: &str) {
        for b in s.bytes() {
            self.write_byte(b);
        }
    }
}

/// serial line over in-memory buffers; input is closed once drained
#[derive(Default)]
pub struct BufferSerial {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl BufferSerial {
    pub fn new() -> Self {
        BufferSerial::default()
    }

    pub fn with_input(input: &[u8]) -> Self {
        BufferSerial {
            input: input.iter().copied().collect(),
            output: Vec::new(),
        }
    }

    pub fn push_input(&mut self, input: &[u8]) {
        self.input.extend(input.iter().copied());
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }
}

impl Serial for BufferSerial {
    fn read_byte(&mut self) -> Option<u8> {
        self.input.pop_front()
    }

    fn write_byte(&mut self, byte: u8) {
        self.output.push(byte);
    }

    fn input_closed(&self) -> bool {
        self.input.is_empty()
    }
}

/// serial line fed from a file and written to another
pub struct FileSerial {
    input: VecDeque<u8>,
    output: Option<BufWriter<File>>,
}

impl FileSerial {
    pub fn open(input: Option<&Path>, output: Option<&Path>) -> Result<FileSerial, io::Error> {
        let input = match input {
            Some(path) => fs::read(path)?.into_iter().collect(),
            None => VecDeque::new(),
        };
        let output = match output {
            Some(path) => Some(BufWriter::new(File::create(path)?)),
            None => None,
        };
        Ok(FileSerial { input, output })
    }

    pub fn flush(&mut self) -> Result<(), io::Error> {
        match self.output.as_mut() {
            Some(out) => out.flush(),
            None => Ok(()),
        }
    }
}

impl Serial for FileSerial {
    fn read_byte(&mut self) -> Option<u8> {
        self.input.pop_front()
    }

    fn write_byte(&mut self, byte: u8) {
        if let Some(out) = self.output.as_mut() {
            if let Err(e) = out.write_all(&[byte]) {
                warn!("serial write failed: {}", e);
            }
        }
    }

    fn input_closed(&self) -> bool {
        self.input.is_empty()
    }
}

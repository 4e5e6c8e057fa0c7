//! Byte-stream transport underneath the device link.

use std::io::{self, Read, Write};

/// A blocking byte-stream to the device.
///
/// The link writes each frame with exactly one `write_frame` call and reads
/// fixed-size responses with `read_response`. Timeouts are the transport's
/// concern: a read that exceeds it must fail with
/// [`io::ErrorKind::TimedOut`] or [`io::ErrorKind::UnexpectedEof`].
pub trait Transport {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;

    fn read_response(&mut self, buf: &mut [u8]) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        (**self).write_frame(frame)
    }

    fn read_response(&mut self, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_response(buf)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        (**self).write_frame(frame)
    }

    fn read_response(&mut self, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_response(buf)
    }
}

/// Adapts any `Read + Write` stream, such as an opened serial port with its
/// read timeout already configured.
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: S,
}

impl<S: Read + Write> StreamTransport<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write> Transport for StreamTransport<S> {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.stream.write_all(frame)?;
        self.stream.flush()
    }

    fn read_response(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.stream.read_exact(buf)
    }
}

/// Read timeout of the UDP sockets, bounds how long a reader thread takes to
/// notice its terminator.
pub(crate) const SOCKET_READ_TIMEOUT_MS: u64 = 100;
/// Large enough for any UDP datagram.
pub(crate) const SOCKET_BUFFER_SIZE: usize = 65535;
/// Capacity of the channel between the socket readers and the driver.
pub(crate) const INPUT_CHANNEL_CAPACITY: usize = 4096;
/// The ranging and info tasks must be able to run side by side.
pub(crate) const MIN_POOL_WORKERS: usize = 2;
pub(crate) const MAX_POOL_WORKERS: usize = 8;

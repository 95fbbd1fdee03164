//! Per-connection session procedure.
//!
//! Each accepted client gets one `Session` that serves the connection
//! to completion:
//!
//! 1. Read one complete request packet.
//! 2. Dispatch on the message kind.
//! 3. Loop — or, inside a realtime dump, interleave request handling
//!    with the pacing loop.
//!
//! Framing and I/O errors tear the session down. Everything a client
//! can trigger with a well-formed request — bad arguments, hardware
//! not running, resource exhaustion — is answered on the wire and the
//! session keeps serving.
//!
//! A capture (bounded batch or realtime stream) owns its resources in
//! a [`CaptureState`]: the mapped dump rings and the scratch buffer.
//! Dropping it on any exit path releases the mappings, so a session
//! returning to idle never leaks a stale capture.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::codec::{PacketCodec, RawRequest};
use crate::error::StreamError;
use crate::hal::{CaptureBoard, Channel};
use crate::mapper::{page_aligned_size, MappedRegion};
use crate::message::{ErrorCode, MainType, MessageKind, OverflowPolicy};
use crate::packet::{
    AudioDataHead, ConfigShrinkVideoStreamRequest, ConfigVideoStreamRequest,
    DumpRealtimeAudioRequest, DumpRealtimeVideoRequest, DumpVideoFrameRequest, Packet, PacketHead,
    VideoDataHead, VERSION_MAJOR, VERSION_MINOR,
};
use crate::pacing::{assess, PacingStep};
use crate::shrink::{copy_frame, shrink_frame, shrunk_dimensions, BYTES_PER_PIXEL};

/// Size of one audio dump page.
pub const AUDIO_PAGE_SIZE: usize = 4096;

/// Idle backoff inside the pacing loop. Well under the interval at
/// which either dump controller can produce a unit, so the in-band
/// request check keeps up with the producer.
const IDLE_POLL: Duration = Duration::from_millis(1);

// Response texts. These are part of the observable protocol contract.
const MSG_MMAP_FAIL: &str = "Memory map fail";
const MSG_MEMORY_ALLOC: &str = "Memory allocate fail";
const MSG_REALTIME_MODE: &str = "Realtime mode is wrong";
const MSG_REALTIME_STREAM: &str = "There is an existing realtime stream";
const MSG_REALTIME_NON_SAME: &str = "Width or height or limit is not the same";
const MSG_FRAME_NUMBER_ZERO: &str = "Frame number is 0";
const MSG_2ND_CHANNEL_NOT_RUN: &str = "2nd channel is not running";
const MSG_NOT_RUNNING: &str = "Capture HW is not running";
const MSG_DUMP_MEMORY_NOT_ENOUGH: &str = "Dump memory is not enough";
const MSG_MEMORY_OVERFLOW: &str = "Stop dump realtime audio/video due to memory overflow";

// ── CaptureMode ──────────────────────────────────────────────────

/// What the session is currently streaming, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureMode {
    Idle,
    NonRealtime,
    RealtimeVideo,
    RealtimeAudio,
}

impl CaptureMode {
    fn is_realtime(self) -> bool {
        matches!(self, CaptureMode::RealtimeVideo | CaptureMode::RealtimeAudio)
    }
}

// ── CaptureState ─────────────────────────────────────────────────

/// Resources of one active capture.
///
/// Built when a dump request passes validation, dropped when the
/// capture ends — which unmaps the rings and frees the scratch
/// buffer on every exit path.
struct CaptureState {
    /// Mapped dump rings, one per channel slot; `None` = unused slot.
    sources: [Option<MappedRegion>; 2],
    /// Staging buffer, one ring unit large. Frames are copied out of
    /// the uncached shared memory before socket writes.
    scratch: Vec<u8>,
    /// Page-aligned stride between ring units.
    unit_aligned_size: usize,
    /// Ring capacity in units.
    dump_limit: u32,
}

/// Allocate the scratch buffer, reporting failure instead of
/// aborting the process.
fn alloc_scratch(size: usize) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size).ok()?;
    buf.resize(size, 0);
    Some(buf)
}

// ── Session ──────────────────────────────────────────────────────

/// One client connection's state machine.
pub struct Session {
    reader: FramedRead<OwnedReadHalf, PacketCodec>,
    writer: OwnedWriteHalf,
    board: Arc<dyn CaptureBoard>,
    /// Kernel memory device the dump rings are mapped from.
    mem: File,

    /// The message kind currently being serviced; stamps the type
    /// field of responses and data frames.
    current: MessageKind,
    mode: CaptureMode,
    stop_dump: bool,

    screen_width: u16,
    screen_height: u16,
    is_shrink: bool,
    shrink_width: u8,
    shrink_height: u8,
}

impl Session {
    /// Wrap an accepted connection and open the memory device.
    pub fn open(
        stream: TcpStream,
        board: Arc<dyn CaptureBoard>,
        mem_device: &Path,
    ) -> Result<Self, StreamError> {
        let _ = stream.set_nodelay(true);
        let mem = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(mem_device)
            .map_err(|source| StreamError::MemDevice {
                path: mem_device.display().to_string(),
                source,
            })?;

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: FramedRead::new(read_half, PacketCodec),
            writer: write_half,
            board,
            mem,
            current: MessageKind::Reset,
            mode: CaptureMode::Idle,
            stop_dump: false,
            screen_width: 0,
            screen_height: 0,
            is_shrink: false,
            shrink_width: 0,
            shrink_height: 0,
        })
    }

    /// Serve the connection until the client disconnects or a fatal
    /// error occurs. Per-session resources are released on return.
    pub async fn run(&mut self) -> Result<(), StreamError> {
        loop {
            let request = match self.reader.next().await {
                Some(result) => result?,
                None => {
                    info!("client disconnected");
                    return Ok(());
                }
            };
            self.dispatch(request).await?;
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────

    async fn dispatch(&mut self, request: RawRequest) -> Result<(), StreamError> {
        let main_type = request.head.main_type()?;
        if main_type != MainType::Request {
            return Err(StreamError::UnexpectedMainType(main_type as u8));
        }
        let kind = MessageKind::try_from(request.head.message_type())?;
        self.current = kind;
        debug!(%kind, length = request.payload.len(), "request");

        match kind {
            MessageKind::Reset => self.handle_reset().await,
            MessageKind::GetVersion => self.handle_get_version().await,
            MessageKind::ConfigVideoStream => self.handle_config_video(&request.payload).await,
            MessageKind::ConfigShrinkVideoStream => {
                self.handle_config_shrink(&request.payload).await
            }
            MessageKind::DumpVideoFrame => self.handle_dump_video(&request.payload).await,
            MessageKind::DumpRealtimeVideoFrame => {
                self.handle_dump_realtime_video(&request.payload).await
            }
            MessageKind::DumpRealtimeAudioPage => {
                self.handle_dump_realtime_audio(&request.payload).await
            }
            MessageKind::StopDumpVideo | MessageKind::StopDumpAudio => {
                self.handle_stop_dump().await
            }
        }
    }

    // ── Wire helpers ─────────────────────────────────────────────

    async fn send_response(&mut self, code: ErrorCode, text: &str) -> Result<(), StreamError> {
        let packet = Packet::response(self.current, code, text.as_bytes().to_vec());
        self.writer.write_all(&packet.to_bytes()).await?;
        Ok(())
    }

    async fn send_ok(&mut self) -> Result<(), StreamError> {
        self.send_response(ErrorCode::Ok, "").await
    }

    /// Answer a rejected request. The session stays up.
    async fn reject(&mut self, code: ErrorCode, text: &str) -> Result<(), StreamError> {
        warn!("{text}");
        self.send_response(code, text).await
    }

    /// Zero-timeout poll of the request stream, for the in-band
    /// request check inside the pacing loops.
    fn poll_request(&mut self) -> Result<Option<RawRequest>, StreamError> {
        match self.reader.next().now_or_never() {
            None => Ok(None),
            Some(Some(result)) => Ok(Some(result?)),
            Some(None) => Err(StreamError::Disconnected),
        }
    }

    // ── Simple handlers ──────────────────────────────────────────

    async fn handle_reset(&mut self) -> Result<(), StreamError> {
        info!("reset");
        if self.mode.is_realtime() {
            return self
                .reject(ErrorCode::RealtimeStreamExists, MSG_REALTIME_STREAM)
                .await;
        }

        self.screen_width = 0;
        self.screen_height = 0;
        self.is_shrink = false;
        self.shrink_width = 0;
        self.shrink_height = 0;
        self.stop_dump = false;
        self.mode = CaptureMode::Idle;

        self.send_ok().await
    }

    async fn handle_get_version(&mut self) -> Result<(), StreamError> {
        info!("get version {VERSION_MAJOR}.{VERSION_MINOR}");
        let packet = Packet::response(
            self.current,
            ErrorCode::Ok,
            vec![VERSION_MAJOR, VERSION_MINOR],
        );
        self.writer.write_all(&packet.to_bytes()).await?;
        Ok(())
    }

    async fn handle_config_video(&mut self, payload: &[u8]) -> Result<(), StreamError> {
        let request = ConfigVideoStreamRequest::decode(payload)?;
        self.screen_width = request.screen_width;
        self.screen_height = request.screen_height;
        info!(
            width = self.screen_width,
            height = self.screen_height,
            "config video stream"
        );
        self.send_ok().await
    }

    async fn handle_config_shrink(&mut self, payload: &[u8]) -> Result<(), StreamError> {
        let request = ConfigShrinkVideoStreamRequest::decode(payload)?;
        self.shrink_width = request.shrink_width;
        self.shrink_height = request.shrink_height;
        self.is_shrink = self.shrink_width != 0 || self.shrink_height != 0;
        info!(
            shrink_width = self.shrink_width,
            shrink_height = self.shrink_height,
            "config shrink"
        );
        self.send_ok().await
    }

    async fn handle_stop_dump(&mut self) -> Result<(), StreamError> {
        info!(mode = ?self.mode, "stop dump");
        if self.mode.is_realtime() {
            self.stop_dump = true;
        }
        self.send_ok().await
    }

    // ── Capture preparation ──────────────────────────────────────

    /// Validate the overflow policy byte of a realtime request.
    async fn check_policy(&mut self, mode: u8) -> Result<Option<OverflowPolicy>, StreamError> {
        match OverflowPolicy::try_from(mode) {
            Ok(policy) => Ok(Some(policy)),
            Err(_) => {
                warn!(mode, "realtime mode not acceptable");
                self.send_response(ErrorCode::Argument, MSG_REALTIME_MODE)
                    .await?;
                Ok(None)
            }
        }
    }

    /// Allocate the scratch buffer and map every non-zero dump
    /// address. `None` means the request was rejected on the wire.
    async fn prepare_capture(
        &mut self,
        addresses: [u32; 2],
        unit_aligned_size: usize,
        dump_limit: u32,
    ) -> Result<Option<CaptureState>, StreamError> {
        let Some(scratch) = alloc_scratch(unit_aligned_size) else {
            self.reject(ErrorCode::MemoryAllocFail, MSG_MEMORY_ALLOC)
                .await?;
            return Ok(None);
        };
        info!(bytes = unit_aligned_size, "allocated dump buffer");

        let map_len = unit_aligned_size * dump_limit as usize;
        let mut sources: [Option<MappedRegion>; 2] = [None, None];
        for (slot, &address) in addresses.iter().enumerate() {
            if address == 0 {
                continue;
            }
            match MappedRegion::map(&self.mem, "dump buffer", u64::from(address), map_len) {
                Ok(region) => {
                    info!("mapped dump ring at {address:#x}, {map_len} bytes");
                    sources[slot] = Some(region);
                }
                Err(e) => {
                    warn!("cannot map dump ring at {address:#x}: {e}");
                    self.send_response(ErrorCode::Argument, MSG_MMAP_FAIL).await?;
                    return Ok(None);
                }
            }
        }

        Ok(Some(CaptureState {
            sources,
            scratch,
            unit_aligned_size,
            dump_limit,
        }))
    }

    /// Captured geometry of a video channel: the crop window when
    /// cropping is enabled, the full frame registers otherwise.
    fn channel_geometry(board: &dyn CaptureBoard, channel: Channel) -> (u32, u32) {
        if board.video_crop_enabled(channel) {
            let crop = board.video_crop(channel);
            (crop.width(), crop.height())
        } else {
            (
                board.video_frame_width(channel),
                board.video_frame_height(channel),
            )
        }
    }

    // ── Non-realtime video dump ──────────────────────────────────

    async fn handle_dump_video(&mut self, payload: &[u8]) -> Result<(), StreamError> {
        let request = DumpVideoFrameRequest::decode(payload)?;
        info!(
            "dump video frames: {} frames, memory1 {:#x}, memory2 {:#x}",
            request.number_of_frames, request.memory_address1, request.memory_address2
        );

        if self.mode.is_realtime() {
            return self
                .reject(ErrorCode::RealtimeStreamExists, MSG_REALTIME_STREAM)
                .await;
        }
        if request.number_of_frames == 0 {
            return self.reject(ErrorCode::Argument, MSG_FRAME_NUMBER_ZERO).await;
        }

        let frame_size =
            self.screen_width as usize * self.screen_height as usize * BYTES_PER_PIXEL;
        let unit_aligned_size = page_aligned_size(frame_size);
        let addresses = [request.memory_address1, request.memory_address2];
        let Some(mut state) = self
            .prepare_capture(addresses, unit_aligned_size, u32::from(request.number_of_frames))
            .await?
        else {
            return Ok(());
        };

        self.mode = CaptureMode::NonRealtime;
        self.send_ok().await?;
        let result = self
            .stream_video_batch(&mut state, request.number_of_frames)
            .await;
        self.mode = CaptureMode::Idle;
        result
    }

    async fn stream_video_batch(
        &mut self,
        state: &mut CaptureState,
        frames: u16,
    ) -> Result<(), StreamError> {
        debug!(frames, "dumping frame batch");
        for frame_number in 0..u32::from(frames) {
            let offset = frame_number as usize * state.unit_aligned_size;
            self.emit_video_frame(state, frame_number, offset).await?;
        }
        Ok(())
    }

    // ── Realtime video dump ──────────────────────────────────────

    async fn handle_dump_realtime_video(&mut self, payload: &[u8]) -> Result<(), StreamError> {
        let request = DumpRealtimeVideoRequest::decode(payload)?;
        info!(
            is_dual = request.is_dual,
            mode = request.mode,
            "dump realtime video"
        );

        if self.mode.is_realtime() {
            return self
                .reject(ErrorCode::RealtimeStreamExists, MSG_REALTIME_STREAM)
                .await;
        }
        let Some(policy) = self.check_policy(request.mode).await? else {
            return Ok(());
        };
        let Some((check_channel, mut state)) =
            self.configure_realtime_video(request.is_dual).await?
        else {
            return Ok(());
        };

        self.mode = CaptureMode::RealtimeVideo;
        self.send_ok().await?;
        let result = self
            .run_realtime_video(&mut state, check_channel, policy)
            .await;
        self.mode = CaptureMode::Idle;
        result
    }

    /// Probe the hardware and build the capture state for a realtime
    /// video stream. `None` means the request was rejected.
    async fn configure_realtime_video(
        &mut self,
        is_dual: bool,
    ) -> Result<Option<(Channel, CaptureState)>, StreamError> {
        let board = Arc::clone(&self.board);

        // Auto-detect the dump channel by the run bits.
        let check_channel = if board.video_running(Channel::A) {
            Channel::A
        } else if board.video_running(Channel::B) {
            Channel::B
        } else {
            self.reject(ErrorCode::Argument, MSG_NOT_RUNNING).await?;
            return Ok(None);
        };

        let (width, height) = Self::channel_geometry(&*board, check_channel);
        self.screen_width = width as u16;
        self.screen_height = height as u16;

        let dump_limit = board.video_dump_limit(check_channel);
        let unit_aligned_size = page_aligned_size(
            self.screen_width as usize * self.screen_height as usize * BYTES_PER_PIXEL,
        );
        let start = board.video_dump_start_address(check_channel);
        let end = board.video_dump_end_address(check_channel);
        info!(
            "realtime video on channel {check_channel}: {width}x{height}, \
             limit {dump_limit}, ring {start:#x}..{end:#x}"
        );

        if !Self::ring_fits(start, end, unit_aligned_size, dump_limit) {
            self.reject(ErrorCode::Argument, MSG_DUMP_MEMORY_NOT_ENOUGH)
                .await?;
            return Ok(None);
        }

        let mut addresses = [start, 0];
        if is_dual {
            let other = check_channel.other();
            if !board.video_running(other) {
                self.reject(ErrorCode::Argument, MSG_2ND_CHANNEL_NOT_RUN)
                    .await?;
                return Ok(None);
            }

            // Dual capture only supports identical parameters on both
            // controllers.
            let (other_width, other_height) = Self::channel_geometry(&*board, other);
            if other_width as u16 != self.screen_width
                || other_height as u16 != self.screen_height
                || board.video_dump_limit(other) != dump_limit
            {
                self.reject(ErrorCode::Argument, MSG_REALTIME_NON_SAME)
                    .await?;
                return Ok(None);
            }

            let other_start = board.video_dump_start_address(other);
            let other_end = board.video_dump_end_address(other);
            info!("second channel {other}: ring {other_start:#x}..{other_end:#x}");
            if !Self::ring_fits(other_start, other_end, unit_aligned_size, dump_limit) {
                self.reject(ErrorCode::Argument, MSG_DUMP_MEMORY_NOT_ENOUGH)
                    .await?;
                return Ok(None);
            }
            addresses[1] = other_start;
        }

        match self
            .prepare_capture(addresses, unit_aligned_size, dump_limit)
            .await?
        {
            Some(state) => Ok(Some((check_channel, state))),
            None => Ok(None),
        }
    }

    /// The ring region must hold strictly more than `limit` units;
    /// equality leaves the controller writing past the mapped range.
    fn ring_fits(start: u32, end: u32, unit_aligned_size: usize, dump_limit: u32) -> bool {
        let span = u64::from(end).saturating_sub(u64::from(start));
        span > unit_aligned_size as u64 * u64::from(dump_limit)
    }

    async fn run_realtime_video(
        &mut self,
        state: &mut CaptureState,
        check_channel: Channel,
        policy: OverflowPolicy,
    ) -> Result<(), StreamError> {
        let mut emitted: u32 = 0;
        loop {
            // In-band request check. The data head is derived from
            // session state at each emit, so an interleaved
            // reconfiguration takes effect from the next frame.
            if let Some(request) = self.poll_request()? {
                Box::pin(self.dispatch(request)).await?;
            }
            if self.stop_dump {
                self.stop_dump = false;
                info!("realtime video stream stopped by client");
                return Ok(());
            }

            // Both channels advance together; one frame counter is
            // enough.
            let hw_count = (self.board.video_frame_count(check_channel) & 0xFFFF) as u16;
            match assess(emitted, hw_count, state.dump_limit) {
                PacingStep::Idle => tokio::time::sleep(IDLE_POLL).await,
                PacingStep::Emit => {
                    let offset = (emitted % state.dump_limit) as usize * state.unit_aligned_size;
                    self.emit_video_frame(state, emitted, offset).await?;
                    emitted += 1;
                }
                PacingStep::Overflow { missed } => match policy {
                    OverflowPolicy::StopWhenOverflow => {
                        warn!("{MSG_MEMORY_OVERFLOW}");
                        self.send_response(
                            ErrorCode::VideoMemoryOverflowStop,
                            MSG_MEMORY_OVERFLOW,
                        )
                        .await?;
                        return Ok(());
                    }
                    OverflowPolicy::BestEffort => {
                        let text = format!("Drop realtime video frame {missed}");
                        warn!("{text}");
                        self.send_response(ErrorCode::VideoMemoryOverflowDrop, &text)
                            .await?;
                        emitted += missed;
                    }
                },
            }
        }
    }

    // ── Realtime audio dump ──────────────────────────────────────

    async fn handle_dump_realtime_audio(&mut self, payload: &[u8]) -> Result<(), StreamError> {
        let request = DumpRealtimeAudioRequest::decode(payload)?;
        info!(mode = request.mode, "dump realtime audio");

        if self.mode.is_realtime() {
            return self
                .reject(ErrorCode::RealtimeStreamExists, MSG_REALTIME_STREAM)
                .await;
        }
        let Some(policy) = self.check_policy(request.mode).await? else {
            return Ok(());
        };
        if !self.board.audio_running() {
            return self.reject(ErrorCode::Argument, MSG_NOT_RUNNING).await;
        }

        let start = self.board.audio_dump_start_address();
        let end = self.board.audio_dump_end_address();
        // The audio controller has no dump-limit register; the ring
        // capacity falls out of the region size.
        let dump_limit = end.saturating_sub(start) / AUDIO_PAGE_SIZE as u32;
        info!("realtime audio: ring {start:#x}..{end:#x}, limit {dump_limit}");

        let Some(mut state) = self
            .prepare_capture([start, 0], AUDIO_PAGE_SIZE, dump_limit)
            .await?
        else {
            return Ok(());
        };

        self.mode = CaptureMode::RealtimeAudio;
        self.send_ok().await?;
        let result = self.run_realtime_audio(&mut state, policy).await;
        self.mode = CaptureMode::Idle;
        result
    }

    async fn run_realtime_audio(
        &mut self,
        state: &mut CaptureState,
        policy: OverflowPolicy,
    ) -> Result<(), StreamError> {
        let mut emitted: u32 = 0;
        loop {
            if let Some(request) = self.poll_request()? {
                // The audio data head is stamped with the kind being
                // streamed; keep it across the inner dispatch.
                let streaming_kind = self.current;
                Box::pin(self.dispatch(request)).await?;
                self.current = streaming_kind;
            }
            if self.stop_dump {
                self.stop_dump = false;
                info!("realtime audio stream stopped by client");
                return Ok(());
            }

            let hw_count = (self.board.audio_page_count() & 0xFFFF) as u16;
            match assess(emitted, hw_count, state.dump_limit) {
                PacingStep::Idle => tokio::time::sleep(IDLE_POLL).await,
                PacingStep::Emit => {
                    let offset = (emitted % state.dump_limit) as usize * state.unit_aligned_size;
                    self.emit_audio_page(state, emitted, offset).await?;
                    emitted += 1;
                }
                PacingStep::Overflow { missed } => match policy {
                    OverflowPolicy::StopWhenOverflow => {
                        warn!("{MSG_MEMORY_OVERFLOW}");
                        self.send_response(
                            ErrorCode::AudioMemoryOverflowStop,
                            MSG_MEMORY_OVERFLOW,
                        )
                        .await?;
                        return Ok(());
                    }
                    OverflowPolicy::BestEffort => {
                        let text = format!("Drop realtime audio page {missed}");
                        warn!("{text}");
                        self.send_response(ErrorCode::AudioMemoryOverflowDrop, &text)
                            .await?;
                        emitted += missed;
                    }
                },
            }
        }
    }

    // ── Emission ─────────────────────────────────────────────────

    /// Send one video frame (head + staged body) from every active
    /// channel. The frame number is shared between the channels.
    async fn emit_video_frame(
        &mut self,
        state: &mut CaptureState,
        frame_number: u32,
        offset: usize,
    ) -> Result<(), StreamError> {
        let (out_w, out_h) = shrunk_dimensions(
            self.screen_width,
            self.screen_height,
            self.shrink_width,
            self.shrink_height,
        );
        let body_len = out_w as usize * out_h as usize * BYTES_PER_PIXEL;
        let frame_size =
            self.screen_width as usize * self.screen_height as usize * BYTES_PER_PIXEL;
        if frame_size > state.unit_aligned_size {
            // Only reachable through an interleaved geometry change
            // that outgrew the mapped ring units.
            return Err(StreamError::FrameExceedsSlot {
                needed: frame_size,
                available: state.unit_aligned_size,
            });
        }

        let head = PacketHead::data(self.current, (VideoDataHead::SIZE + body_len) as u32);
        let CaptureState {
            sources,
            scratch,
            unit_aligned_size,
            ..
        } = state;

        for (slot, source) in sources.iter().enumerate() {
            let Some(region) = source else { continue };
            let slot_data = &region.as_slice()[offset..offset + *unit_aligned_size];

            let staged = if self.is_shrink {
                shrink_frame(
                    slot_data,
                    scratch,
                    self.screen_width,
                    self.screen_height,
                    self.shrink_width,
                    self.shrink_height,
                )
            } else {
                copy_frame(slot_data, scratch, self.screen_width, self.screen_height)
            };
            debug_assert_eq!(staged, body_len);

            let data_head = VideoDataHead {
                frame_number,
                width: out_w,
                height: out_h,
                channel: slot as u8,
            };
            let mut head_bytes = [0u8; PacketHead::SIZE + VideoDataHead::SIZE];
            head_bytes[..PacketHead::SIZE].copy_from_slice(&head.encode());
            head_bytes[PacketHead::SIZE..].copy_from_slice(&data_head.encode());

            self.writer.write_all(&head_bytes).await?;
            self.writer.write_all(&scratch[..staged]).await?;
        }

        Ok(())
    }

    /// Send one audio page (head + 4096-byte body).
    async fn emit_audio_page(
        &mut self,
        state: &mut CaptureState,
        page_count: u32,
        offset: usize,
    ) -> Result<(), StreamError> {
        let CaptureState {
            sources, scratch, ..
        } = state;
        let Some(region) = sources[0].as_ref() else {
            return Ok(());
        };
        scratch[..AUDIO_PAGE_SIZE]
            .copy_from_slice(&region.as_slice()[offset..offset + AUDIO_PAGE_SIZE]);

        let head = PacketHead::data(
            self.current,
            (AudioDataHead::SIZE + AUDIO_PAGE_SIZE) as u32,
        );
        let data_head = AudioDataHead { page_count };
        let mut head_bytes = [0u8; PacketHead::SIZE + AudioDataHead::SIZE];
        head_bytes[..PacketHead::SIZE].copy_from_slice(&head.encode());
        head_bytes[PacketHead::SIZE..].copy_from_slice(&data_head.encode());

        self.writer.write_all(&head_bytes).await?;
        self.writer.write_all(&scratch[..AUDIO_PAGE_SIZE]).await?;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

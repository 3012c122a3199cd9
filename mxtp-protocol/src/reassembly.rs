//! Joins UDP fragments of the same sampling instance into logical frames.
//!
//! Fragments are keyed by `(character_id, sample_counter)`. A frame is
//!  complete when its last-fragment bit has been seen and every fragment
//!  index up to the highest one is present; the payloads are then
//!  concatenated in fragment order and decoded. Packet loss, reordering and
//!  interleaving across characters are all expected; bounded memory is
//!  guaranteed by a per-character capacity, a stale-sample window and a
//!  wall-clock timeout driven by [`Reassembler::tick`].

use crate::config::MxtpConfig;
use crate::error::ProtocolError;
use crate::header::{decode_datagram, DatagramHeader, MessageType};
use crate::payload::{decode_payload, Payload};
use crate::segment::SegmentLayout;
use crate::sink::FrameSink;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace, warn};

/// A fully reassembled and decoded sampling instance for one character.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct CompletedFrame {
    pub character_id: u8,
    pub sample_counter: u32,
    /// milliseconds since the start of the recording
    pub time_code_ms: u32,
    pub message_type: MessageType,
    /// the item groups announced by the authoritative (fragment 0) header
    pub layout: SegmentLayout,
    pub payload: Payload,
}

impl CompletedFrame {
    /// Resolves a wire segment id (`index + 1`) to its name under this
    ///  frame's layout and segment ordering.
    pub fn segment_name(&self, segment_id: u32) -> Option<&'static str> {
        if segment_id == 0 {
            return None;
        }
        self.layout.segment_name(self.message_type.segment_order(), segment_id - 1)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum EvictionReason {
    /// the per-character capacity bound was exceeded
    Capacity,
    /// the sample counter fell out of the reassembly window
    StaleWindow,
    /// no fragment arrived for longer than the configured timeout
    Timeout,
}

/// An incomplete partial frame that was given up on. Evictions are expected
///  telemetry on a lossy transport, not errors.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Eviction {
    pub character_id: u8,
    pub sample_counter: u32,
    pub fragments_buffered: usize,
    pub reason: EvictionReason,
}

/// Counters for everything that was dropped, skipped or given up on.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct StreamStats {
    pub datagrams_received: u64,
    pub frames_emitted: u64,
    pub bad_magic: u64,
    pub bad_message_type: u64,
    pub truncated: u64,
    pub length_mismatch: u64,
    pub misaligned_payloads: u64,
    pub malformed_payloads: u64,
    pub inconsistent_fragments: u64,
    pub duplicate_frames: u64,
    pub evicted_capacity: u64,
    pub evicted_stale: u64,
    pub evicted_timeout: u64,
}

/// Fragments buffered for one `(character, sample)` key.
struct PartialFrame {
    /// authoritative header; replaced by fragment 0's header once that
    ///  fragment arrives (any fragment may be the first to arrive)
    header: DatagramHeader,
    /// fragment index -> payload bytes
    fragments: BTreeMap<u8, Vec<u8>>,
    last_seen: bool,
    highest_index: u8,
    /// sum of `item_count` over the buffered fragments
    total_items: u32,
    first_seen_ms: u64,
}

impl PartialFrame {
    fn new(header: &DatagramHeader, first_seen_ms: u64) -> PartialFrame {
        PartialFrame {
            header: header.clone(),
            fragments: BTreeMap::new(),
            last_seen: false,
            highest_index: 0,
            total_items: 0,
            first_seen_ms,
        }
    }

    /// All fragments of a frame must agree on the message type and the
    ///  segment counts; the fragment index and item count legitimately differ.
    fn is_consistent_with(&self, header: &DatagramHeader) -> bool {
        self.header.message_type == header.message_type
            && self.header.body_segment_count == header.body_segment_count
            && self.header.prop_count == header.prop_count
            && self.header.finger_segment_count == header.finger_segment_count
    }

    fn insert_fragment(&mut self, header: &DatagramHeader, payload: &[u8]) {
        let index = header.fragment_index();
        if self.fragments.contains_key(&index) {
            debug!("duplicate fragment {} (character {}, sample {}) - ignoring",
                index, header.character_id, header.sample_counter);
            return;
        }

        self.fragments.insert(index, payload.to_vec());
        self.last_seen |= header.is_last_fragment();
        self.highest_index = self.highest_index.max(index);
        self.total_items += header.item_count as u32;
        if index == 0 {
            self.header = header.clone();
        }
    }

    /// Fragment indices are unique keys, so a gap-free range `0..=highest`
    ///  is equivalent to a simple length check.
    fn is_complete(&self) -> bool {
        self.last_seen && self.fragments.len() == self.highest_index as usize + 1
    }

    /// The frame's payload: all fragments concatenated in ascending
    ///  fragment-index order.
    fn concatenated_payload(&self) -> Vec<u8> {
        let total_len = self.fragments.values().map(Vec::len).sum();
        let mut combined = Vec::with_capacity(total_len);
        for payload in self.fragments.values() {
            combined.extend_from_slice(payload);
        }
        combined
    }
}

#[derive(Default)]
struct CharacterState {
    /// in-flight partials by sample counter
    partials: BTreeMap<u32, PartialFrame>,
    /// sample counters that already produced a frame, pruned to the
    ///  reassembly window. A key is emitted at most once; late duplicates
    ///  within the window are dropped here.
    completed: BTreeSet<u32>,
    last_sample: Option<u32>,
}

impl CharacterState {
    /// true if the sample was not completed before
    fn mark_completed(&mut self, sample: u32) -> bool {
        self.completed.insert(sample)
    }

    fn prune_completed(&mut self, sample: u32, window: u32) {
        let lower = sample.saturating_sub(window);
        let upper = sample.saturating_add(window);
        self.completed = self.completed.split_off(&lower);
        let _ = self.completed.split_off(&upper.saturating_add(1));
    }

    fn note_sample_progress(&mut self, character_id: u8, sample: u32) {
        if let Some(last) = self.last_sample {
            if sample < last {
                debug!("sample counter for character {} went back from {} to {} - new recording started?",
                    character_id, last, sample);
            } else if sample > last.saturating_add(1) {
                debug!("missed {} samples for character {}", sample - last - 1, character_id);
            }
        }
        self.last_sample = Some(sample);
    }
}

/// The reassembly state machine. Single-threaded and synchronous: the
///  transport calls [`push`](Self::push) per received datagram and
///  [`tick`](Self::tick) periodically; both may be omitted or interleaved
///  freely. Wrap instances under external mutual exclusion to share them.
pub struct Reassembler {
    config: MxtpConfig,
    characters: FxHashMap<u8, CharacterState>,
    stats: StreamStats,
}

impl Reassembler {
    pub fn new(config: MxtpConfig) -> Reassembler {
        Reassembler {
            config,
            characters: FxHashMap::default(),
            stats: StreamStats::default(),
        }
    }

    pub fn config(&self) -> &MxtpConfig {
        &self.config
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// All character ids seen so far, in ascending order.
    pub fn characters(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self.characters.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of incomplete partials currently buffered, across characters.
    pub fn in_flight_partials(&self) -> usize {
        self.characters.values().map(|s| s.partials.len()).sum()
    }

    /// Processes one raw datagram. Returns the frames this datagram
    ///  completed - usually none or one. Frames are emitted in completion
    ///  order, which is not necessarily sample-counter order; each
    ///  `(character, sample)` key is emitted at most once.
    pub fn push(&mut self, datagram: &[u8], now_ms: u64) -> Vec<CompletedFrame> {
        self.stats.datagrams_received += 1;
        let mut frames = Vec::new();
        if let Err(error) = self.do_push(datagram, now_ms, &mut frames) {
            self.record_push_error(&error);
        }
        frames
    }

    /// [`push`](Self::push), forwarding each completed frame to the sink
    ///  synchronously from within this call.
    pub fn dispatch(&mut self, datagram: &[u8], now_ms: u64, sink: &mut dyn FrameSink) {
        for frame in self.push(datagram, now_ms) {
            sink.on_frame(&frame);
        }
    }

    fn do_push(&mut self, datagram: &[u8], now_ms: u64, frames: &mut Vec<CompletedFrame>) -> Result<(), ProtocolError> {
        let (header, payload) = decode_datagram(datagram, self.config.lenient_length)?;
        trace!("datagram: character {}, sample {}, type {:02}, fragment {} (last: {}), {} payload bytes",
            header.character_id, header.sample_counter, header.message_type,
            header.fragment_index(), header.is_last_fragment(), payload.len());

        let window = self.config.reassembly_window_samples;
        let state = self.characters.entry(header.character_id).or_default();
        state.note_sample_progress(header.character_id, header.sample_counter);

        let message_type = header.recognized_type()?;

        // receiving sample s moves the window: partials below s - W are lost causes
        let stale_cutoff = header.sample_counter.saturating_sub(window);
        let stale: Vec<u32> = state.partials.range(..stale_cutoff).map(|(&s, _)| s).collect();
        for sample in stale {
            let partial = state.partials.remove(&sample).expect("key was just enumerated");
            debug!("partial (character {}, sample {}) fell out of the reassembly window with {} fragments buffered - evicting",
                header.character_id, sample, partial.fragments.len());
            self.stats.evicted_stale += 1;
        }
        state.prune_completed(header.sample_counter, window);

        // single-fragment fast path: no reassembly table involved
        if header.is_last_fragment() && header.fragment_index() == 0 {
            if let Some(superseded) = state.partials.remove(&header.sample_counter) {
                warn!("single-fragment frame (character {}, sample {}) supersedes a partial with {} buffered fragments - discarding the partial",
                    header.character_id, header.sample_counter, superseded.fragments.len());
                self.stats.inconsistent_fragments += 1;
            }
            if !state.mark_completed(header.sample_counter) {
                debug!("frame (character {}, sample {}) was already emitted - dropping duplicate",
                    header.character_id, header.sample_counter);
                self.stats.duplicate_frames += 1;
                return Ok(());
            }
            let frame = Self::decode_frame(&header, message_type, payload, header.item_count as u32)?;
            self.stats.frames_emitted += 1;
            frames.push(frame);
            return Ok(());
        }

        if state.completed.contains(&header.sample_counter) {
            debug!("fragment for already-emitted frame (character {}, sample {}) - dropping duplicate",
                header.character_id, header.sample_counter);
            self.stats.duplicate_frames += 1;
            return Ok(());
        }

        let partial = match state.partials.entry(header.sample_counter) {
            Entry::Occupied(entry) => {
                let partial = entry.into_mut();
                if !partial.is_consistent_with(&header) {
                    warn!("{} (character {}, sample {}) - discarding the partial and starting over",
                        ProtocolError::InconsistentFragment, header.character_id, header.sample_counter);
                    self.stats.inconsistent_fragments += 1;
                    *partial = PartialFrame::new(&header, now_ms);
                }
                partial
            }
            Entry::Vacant(entry) => entry.insert(PartialFrame::new(&header, now_ms)),
        };
        partial.insert_fragment(&header, payload);

        if partial.is_complete() {
            let partial = state.partials.remove(&header.sample_counter).expect("the partial was just updated");
            state.mark_completed(header.sample_counter);
            let combined = partial.concatenated_payload();
            let frame = Self::decode_frame(&partial.header, message_type, &combined, partial.total_items)?;
            self.stats.frames_emitted += 1;
            frames.push(frame);
            return Ok(());
        }

        // the capacity bound keeps memory at O(characters * capacity) even
        //  when tails keep getting lost
        while state.partials.len() > self.config.reassembly_capacity_per_character {
            let oldest = state.partials.iter()
                .min_by_key(|(_, p)| p.first_seen_ms)
                .map(|(&s, _)| s)
                .expect("the length was just checked");
            let partial = state.partials.remove(&oldest).expect("key was just enumerated");
            debug!("capacity bound exceeded for character {} - evicting oldest partial (sample {}, {} fragments)",
                header.character_id, oldest, partial.fragments.len());
            self.stats.evicted_capacity += 1;
        }

        Ok(())
    }

    /// Evicts partials that have not seen a fragment for the configured
    ///  timeout. Call periodically with a monotonic millisecond clock; the
    ///  clock source is the caller's, the core performs no syscalls.
    pub fn tick(&mut self, now_ms: u64) -> Vec<Eviction> {
        let mut evictions = Vec::new();
        for (&character_id, state) in self.characters.iter_mut() {
            let timed_out: Vec<u32> = state.partials.iter()
                .filter(|(_, partial)| now_ms >= partial.first_seen_ms + self.config.reassembly_timeout_ms)
                .map(|(&sample, _)| sample)
                .collect();
            for sample in timed_out {
                let partial = state.partials.remove(&sample).expect("key was just enumerated");
                debug!("partial (character {}, sample {}) timed out with {} fragments buffered - evicting",
                    character_id, sample, partial.fragments.len());
                evictions.push(Eviction {
                    character_id,
                    sample_counter: sample,
                    fragments_buffered: partial.fragments.len(),
                    reason: EvictionReason::Timeout,
                });
            }
        }
        self.stats.evicted_timeout += evictions.len() as u64;
        evictions
    }

    fn decode_frame(
        header: &DatagramHeader,
        message_type: MessageType,
        payload: &[u8],
        announced_items: u32,
    ) -> Result<CompletedFrame, ProtocolError> {
        let payload = decode_payload(message_type, header, payload)?;
        if message_type.item_stride().is_some() && payload.item_count() as u32 != announced_items {
            // legitimate when out-of-range items were dropped
            debug!("frame (character {}, sample {}) decoded {} items, fragments announced {}",
                header.character_id, header.sample_counter, payload.item_count(), announced_items);
        }
        Ok(CompletedFrame {
            character_id: header.character_id,
            sample_counter: header.sample_counter,
            time_code_ms: header.time_code_ms,
            message_type,
            layout: SegmentLayout::from_header(header),
            payload,
        })
    }

    fn record_push_error(&mut self, error: &ProtocolError) {
        match error {
            ProtocolError::BadMagic => {
                self.stats.bad_magic += 1;
                if self.config.strict_magic {
                    warn!("{} - discarding datagram", error);
                } else {
                    debug!("{} - skipping datagram", error);
                }
            }
            ProtocolError::BadMessageType { .. } => {
                self.stats.bad_message_type += 1;
                debug!("{} - skipping datagram", error);
            }
            ProtocolError::Truncated { .. } => {
                self.stats.truncated += 1;
                warn!("{} - discarding fragment", error);
            }
            ProtocolError::LengthMismatch { .. } => {
                self.stats.length_mismatch += 1;
                warn!("{} - discarding datagram", error);
            }
            ProtocolError::MisalignedPayload { .. } => {
                self.stats.misaligned_payloads += 1;
                warn!("{} - dropping frame", error);
            }
            ProtocolError::Malformed(_) => {
                self.stats.malformed_payloads += 1;
                warn!("{} - dropping frame", error);
            }
            ProtocolError::SegmentOutOfRange { .. } | ProtocolError::InconsistentFragment => {
                // handled at item / fragment scope, never surfaces here
                warn!("{} - dropping frame", error);
            }
        }
    }
}

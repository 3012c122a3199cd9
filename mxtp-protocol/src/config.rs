use anyhow::bail;

/// All knobs of the decode and reassembly pipeline. One value is handed to the
///  [`Reassembler`](crate::reassembly::Reassembler) at construction; there is
///  no global state.
#[derive(Clone, Debug)]
pub struct MxtpConfig {
    /// On receiving sample counter `s` for a character, partials with a
    ///  counter below `s - reassembly_window_samples` are evicted as stale.
    pub reassembly_window_samples: u32,

    /// Upper bound on in-flight sample counters per character. The oldest
    ///  incomplete partial is evicted when the bound is exceeded.
    pub reassembly_capacity_per_character: usize,

    /// Partials older than this are evicted by [`Reassembler::tick`](crate::reassembly::Reassembler::tick).
    pub reassembly_timeout_ms: u64,

    /// When the header's `payload_size` disagrees with the bytes actually
    ///  present, clamp to the smaller of the two instead of discarding the
    ///  datagram.
    pub lenient_length: bool,

    /// Composite point ids are `multiplier * segment_id + local_point_id`.
    ///  The protocol documentation states 100 but its worked example uses 256.
    pub point_id_multiplier: u32,

    /// Log datagrams without the MXTP identifier as errors instead of
    ///  silently skipping them. Either way the datagram is discarded.
    pub strict_magic: bool,
}

impl Default for MxtpConfig {
    fn default() -> MxtpConfig {
        MxtpConfig {
            reassembly_window_samples: 64,
            reassembly_capacity_per_character: 8,
            reassembly_timeout_ms: 500,
            lenient_length: true,
            point_id_multiplier: 256,
            strict_magic: true,
        }
    }
}

impl MxtpConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.reassembly_window_samples == 0 {
            bail!("reassembly window must be at least one sample");
        }
        if self.reassembly_capacity_per_character == 0 {
            bail!("per-character reassembly capacity must be at least one");
        }
        if self.point_id_multiplier != 100 && self.point_id_multiplier != 256 {
            bail!("point id multiplier must be 100 or 256, was {}", self.point_id_multiplier);
        }
        Ok(())
    }
}

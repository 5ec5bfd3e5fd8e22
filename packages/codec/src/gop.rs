//! GOP structure, picture order counts and reference picture management.
//!
//! Everything in this module is pure state-machine logic: the frame-type
//! decision maps encode order to display order and picture type, the POC
//! counter implements the type-0 wraparound arithmetic, and the reference
//! list keeps the short-term DPB ring plus the per-slice RefPicList0/1
//! construction mandated by the H.264 default ordering rules.

/// Log2 of `MaxFrameNum`.
pub const LOG2_MAX_FRAME_NUM: u32 = 16;
/// Log2 of `MaxPicOrderCntLsb`.
pub const LOG2_MAX_PIC_ORDER_CNT_LSB: u32 = 8;

/// `frame_num` wraps at this value.
pub const MAX_FRAME_NUM: u32 = 1 << LOG2_MAX_FRAME_NUM;
/// Picture order count LSB range.
pub const MAX_PIC_ORDER_CNT_LSB: u32 = 1 << LOG2_MAX_PIC_ORDER_CNT_LSB;

/// Picture type produced by the frame-type decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Instantaneous decoder refresh - resets all reference state.
    Idr,
    /// Intra picture without a reference reset.
    I,
    /// Forward-predicted picture.
    P,
    /// Bi-predicted picture.
    B,
}

impl FrameKind {
    /// True for pictures a decoder can start from.
    #[must_use]
    pub fn is_intra(self) -> bool {
        matches!(self, Self::Idr | Self::I)
    }

    /// True for pictures that become short-term references.
    #[must_use]
    pub fn is_reference(self) -> bool {
        !matches!(self, Self::B)
    }
}

/// Maps an encoding-order index onto `(display_order, FrameKind)` for the
/// configured GOP shape.
///
/// The mapping is deterministic and stateless. GOP patterns follow the
/// H.264 reference model: `IDR (PBB)(PBB)(IBB)(PBB)...` for `ip_period`
/// above 1, `IDR PPPP IPPP...` otherwise.
#[must_use]
pub fn frame_kind_for(
    encoding_order: u64,
    intra_period: u32,
    intra_idr_period: u32,
    ip_period: u32,
) -> (u64, FrameKind) {
    if intra_period == 1 {
        // Intra-only stream; IDR cadence is the only decision left.
        let kind = if intra_idr_period == 0 {
            if encoding_order == 0 {
                FrameKind::Idr
            } else {
                FrameKind::I
            }
        } else if encoding_order % u64::from(intra_idr_period) == 0 {
            FrameKind::Idr
        } else {
            FrameKind::I
        };
        return (encoding_order, kind);
    }

    // An open-ended stream never resets after the first IDR.
    let intra_idr_period = if intra_period == 0 { 0 } else { intra_idr_period };

    let gop_size = u64::from(intra_idr_period) + if ip_period == 1 { 0 } else { 1 };
    let gop_position = if intra_idr_period == 0 {
        encoding_order
    } else {
        encoding_order % gop_size
    };
    let ip = u64::from(ip_period);

    if gop_position == 0 {
        (encoding_order, FrameKind::Idr)
    } else if (gop_position - 1) % ip != 0 {
        // Trailing B picture; displays before the frame submitted ahead
        // of it.
        (encoding_order - 1, FrameKind::B)
    } else {
        let display_order = encoding_order + ip - 1;
        let is_i = intra_period != 0
            && gop_position >= 2
            && ((ip_period == 1 && gop_position % u64::from(intra_period) == 0)
                || (ip_period >= 2
                    && ((gop_position - 1) / ip) % (u64::from(intra_period) / ip) == 0));
        if is_i {
            (display_order, FrameKind::I)
        } else {
            (display_order, FrameKind::P)
        }
    }
}

/// Picture-order-count state for POC type 0.
///
/// Tracks the MSB/LSB pair of the most recent non-B picture and extends
/// each new LSB across wraparound per the reference decoding process.
#[derive(Debug, Default)]
pub struct PocCounter {
    prev_msb: i32,
    prev_lsb: i32,
}

impl PocCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes `TopFieldOrderCnt` for a picture with the given LSB.
    ///
    /// IDR pictures restart the tracked state at zero; B pictures read it
    /// without updating.
    pub fn top_field_order_cnt(&mut self, pic_order_cnt_lsb: u32, kind: FrameKind) -> i32 {
        let lsb = pic_order_cnt_lsb as i32;
        let max = MAX_PIC_ORDER_CNT_LSB as i32;

        let (prev_msb, prev_lsb) = if kind == FrameKind::Idr {
            (0, 0)
        } else {
            (self.prev_msb, self.prev_lsb)
        };

        let msb = if lsb < prev_lsb && prev_lsb - lsb >= max / 2 {
            prev_msb + max
        } else if lsb > prev_lsb && lsb - prev_lsb > max / 2 {
            prev_msb - max
        } else {
            prev_msb
        };

        if kind.is_reference() {
            self.prev_msb = msb;
            self.prev_lsb = lsb;
        }

        msb + lsb
    }
}

/// One short-term reference picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefPicture {
    /// Backing reconstruction surface.
    pub surface_id: u32,
    /// `frame_num` of the picture.
    pub frame_num: u32,
    /// `TopFieldOrderCnt` of the picture.
    pub poc: i32,
}

/// The short-term reference ring: most recent first, capped at
/// `num_ref_frames`, shifted on every non-B picture.
#[derive(Debug)]
pub struct ReferenceList {
    entries: Vec<RefPicture>,
    capacity: usize,
}

impl ReferenceList {
    #[must_use]
    pub fn new(num_ref_frames: u32) -> Self {
        Self {
            entries: Vec::with_capacity(num_ref_frames as usize),
            capacity: num_ref_frames as usize,
        }
    }

    /// Drop all short-term references (IDR reset).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of held references.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current ring contents, most recent first.
    #[must_use]
    pub fn entries(&self) -> &[RefPicture] {
        &self.entries
    }

    /// Insert the just-encoded picture as the newest short-term reference,
    /// evicting the oldest when the ring is full.
    pub fn push(&mut self, picture: RefPicture) {
        if self.entries.len() == self.capacity {
            self.entries.pop();
        }
        self.entries.insert(0, picture);
    }

    /// RefPicList0 for a P slice: short-term references ordered by
    /// descending `frame_num`.
    #[must_use]
    pub fn ref_list_p(&self) -> Vec<RefPicture> {
        let mut list = self.entries.clone();
        list.sort_by(|a, b| b.frame_num.cmp(&a.frame_num));
        list
    }

    /// RefPicList0 and RefPicList1 for a B slice at `current_poc`.
    ///
    /// List 0 holds pictures before the current one (descending POC)
    /// followed by pictures after it (ascending POC); list 1 is the
    /// mirror image, per the H.264 default construction for POC type 0.
    #[must_use]
    pub fn ref_lists_b(&self, current_poc: i32) -> (Vec<RefPicture>, Vec<RefPicture>) {
        let mut before: Vec<RefPicture> = self
            .entries
            .iter()
            .copied()
            .filter(|r| r.poc <= current_poc)
            .collect();
        let mut after: Vec<RefPicture> = self
            .entries
            .iter()
            .copied()
            .filter(|r| r.poc > current_poc)
            .collect();
        before.sort_by(|a, b| b.poc.cmp(&a.poc));
        after.sort_by(|a, b| a.poc.cmp(&b.poc));

        let mut list0 = before.clone();
        list0.extend(after.iter().copied());
        let mut list1 = after;
        list1.extend(before);
        (list0, list1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(intra: u32, idr: u32, ip: u32, n: u64) -> Vec<FrameKind> {
        (0..n).map(|eo| frame_kind_for(eo, intra, idr, ip).1).collect()
    }

    #[test]
    fn test_decision_is_deterministic() {
        for eo in 0..200 {
            let a = frame_kind_for(eo, 30, 60, 2);
            let b = frame_kind_for(eo, 30, 60, 2);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_open_gop_all_p() {
        // intra_period=0, ip_period=1: one IDR then P forever.
        let seq = kinds(0, 60, 1, 12);
        assert_eq!(seq[0], FrameKind::Idr);
        assert!(seq[1..].iter().all(|&k| k == FrameKind::P));
    }

    #[test]
    fn test_intra_only_every_frame_idr() {
        let seq = kinds(1, 1, 1, 6);
        assert!(seq.iter().all(|&k| k == FrameKind::Idr));
    }

    #[test]
    fn test_intra_only_idr_every_third() {
        let seq = kinds(1, 3, 1, 9);
        use FrameKind::*;
        assert_eq!(seq, vec![Idr, I, I, Idr, I, I, Idr, I, I]);
    }

    #[test]
    fn test_periodic_i_without_idr() {
        // intra_period=6, idr_period=0, ip_period=1:
        // IDR P P P P P I P P P P P I ...
        let seq = kinds(6, 0, 1, 13);
        use FrameKind::*;
        assert_eq!(
            seq,
            vec![Idr, P, P, P, P, P, I, P, P, P, P, P, I]
        );
    }

    #[test]
    fn test_b_frame_gop_with_display_orders() {
        // intra_period=2, idr_period=4, ip_period=2:
        // IDR (P B)(I B) in coding order, B pictures displaying first.
        let got: Vec<(u64, FrameKind)> =
            (0..6).map(|eo| frame_kind_for(eo, 2, 4, 2)).collect();
        use FrameKind::*;
        assert_eq!(got[0], (0, Idr));
        assert_eq!(got[1], (2, P));
        assert_eq!(got[2], (1, B));
        assert_eq!(got[3], (4, I));
        assert_eq!(got[4], (3, B));
        // GOP of 5 coded pictures wraps back to an IDR.
        assert_eq!(got[5], (5, Idr));
    }

    #[test]
    fn test_poc_wraparound_increments_msb() {
        let mut poc = PocCounter::new();
        let a = poc.top_field_order_cnt(250, FrameKind::P);
        let b = poc.top_field_order_cnt(2, FrameKind::P);
        assert_eq!(a, 250);
        assert_eq!(b, 256 + 2);
        assert!(b > a);
    }

    #[test]
    fn test_poc_backward_wrap_decrements_msb() {
        let mut poc = PocCounter::new();
        assert_eq!(poc.top_field_order_cnt(2, FrameKind::P), 2);
        // A large jump forward is interpreted as a backwards wrap.
        assert_eq!(poc.top_field_order_cnt(250, FrameKind::B), 250 - 256);
    }

    #[test]
    fn test_poc_idr_resets_tracking() {
        let mut poc = PocCounter::new();
        poc.top_field_order_cnt(250, FrameKind::P);
        poc.top_field_order_cnt(2, FrameKind::P); // msb now 256
        assert_eq!(poc.top_field_order_cnt(0, FrameKind::Idr), 0);
        assert_eq!(poc.top_field_order_cnt(2, FrameKind::P), 2);
    }

    #[test]
    fn test_poc_b_frames_do_not_update_state() {
        let mut poc = PocCounter::new();
        poc.top_field_order_cnt(10, FrameKind::P);
        let b = poc.top_field_order_cnt(8, FrameKind::B);
        assert_eq!(b, 8);
        // The P at lsb 12 still extends from (0, 10), not from the B.
        assert_eq!(poc.top_field_order_cnt(12, FrameKind::P), 12);
    }

    #[test]
    fn test_reference_ring_bounded_and_ordered() {
        let mut refs = ReferenceList::new(4);
        for i in 0..7u32 {
            refs.push(RefPicture {
                surface_id: i,
                frame_num: i,
                poc: (i * 2) as i32,
            });
        }
        assert_eq!(refs.len(), 4);
        let frame_nums: Vec<u32> = refs.entries().iter().map(|r| r.frame_num).collect();
        // Most recent first, oldest evicted.
        assert_eq!(frame_nums, vec![6, 5, 4, 3]);
    }

    #[test]
    fn test_ref_list_p_descending_frame_num() {
        let mut refs = ReferenceList::new(4);
        for frame_num in [3u32, 1, 2] {
            refs.push(RefPicture {
                surface_id: frame_num,
                frame_num,
                poc: frame_num as i32,
            });
        }
        let list = refs.ref_list_p();
        let order: Vec<u32> = list.iter().map(|r| r.frame_num).collect();
        assert_eq!(order, vec![3, 2, 1]);
    }

    #[test]
    fn test_ref_lists_b_partition_around_poc() {
        let mut refs = ReferenceList::new(4);
        for (frame_num, poc) in [(0u32, 0i32), (1, 4), (2, 8), (3, 12)] {
            refs.push(RefPicture {
                surface_id: frame_num,
                frame_num,
                poc,
            });
        }
        // Current B picture at POC 6: {4, 0} before, {8, 12} after.
        let (list0, list1) = refs.ref_lists_b(6);
        let poc0: Vec<i32> = list0.iter().map(|r| r.poc).collect();
        let poc1: Vec<i32> = list1.iter().map(|r| r.poc).collect();
        assert_eq!(poc0, vec![4, 0, 8, 12]);
        assert_eq!(poc1, vec![8, 12, 4, 0]);
    }

    #[test]
    fn test_idr_clears_ring() {
        let mut refs = ReferenceList::new(2);
        refs.push(RefPicture {
            surface_id: 0,
            frame_num: 0,
            poc: 0,
        });
        refs.clear();
        assert!(refs.is_empty());
    }
}

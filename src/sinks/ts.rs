//! Elementary-stream to MPEG-TS to RTP sink.
//!
//! Each coded access unit is wrapped in a PES packet and cut into
//! 188-byte transport cells on the video PID; PAT and PMT precede every
//! keyframe so late joiners can lock on at the next IDR. Cells leave the
//! box bundled seven to an RTP datagram, the conventional fit under a
//! 1500-byte MTU.

use std::net::UdpSocket;

use bytes::{BufMut, BytesMut};
use tracing::{info, warn};
use vastream_codec::CodedSink;

use super::{set_dscp, write_rtp_header};

/// One transport cell.
pub const TS_PACKET_SIZE: usize = 188;
/// Cells bundled into one RTP datagram.
pub const CELLS_PER_DATAGRAM: usize = 7;

const SYNC_BYTE: u8 = 0x47;
const PAT_PID: u16 = 0x0000;
const PMT_PID: u16 = 0x1000;
const VIDEO_PID: u16 = 0x0100;
const STREAM_TYPE_H264: u8 = 0x1B;
/// Static payload type for MPEG-2 transport streams.
const PAYLOAD_TYPE_MP2T: u8 = 33;

/// ES -> TS -> RTP output sink.
pub struct TsRtpSink {
    socket: Option<UdpSocket>,
    sequence: u16,
    timestamp: u32,
    timestamp_step: u32,
    ssrc: u32,
    pts: u64,
    pts_step: u64,
    cc_pat: u8,
    cc_pmt: u8,
    cc_video: u8,
}

impl TsRtpSink {
    /// Create the sink, connected to `address:port`. A connect failure
    /// logs and leaves the sink disabled.
    #[must_use]
    pub fn new(address: &str, port: u16, dscp: u32, frame_rate: u32) -> Self {
        let socket = match open_socket(address, port, dscp) {
            Ok(socket) => {
                info!(%address, port, "RTP/TS sink streaming");
                Some(socket)
            }
            Err(err) => {
                warn!(%err, %address, port, "RTP/TS sink disabled");
                None
            }
        };
        let fps = u64::from(frame_rate.max(1));
        Self {
            socket,
            sequence: rand::random(),
            timestamp: rand::random(),
            timestamp_step: 90_000 / frame_rate.max(1),
            ssrc: rand::random(),
            // Give the first PTS some lead so a decoder's clock recovery
            // has room before the first presentation time.
            pts: 90_000 / 2,
            pts_step: 90_000 / fps,
            cc_pat: 0,
            cc_pmt: 0,
            cc_video: 0,
        }
    }

    /// Disabled sink constructor.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            socket: None,
            sequence: 0,
            timestamp: 0,
            timestamp_step: 0,
            ssrc: 0,
            pts: 0,
            pts_step: 0,
            cc_pat: 0,
            cc_pmt: 0,
            cc_video: 0,
        }
    }

    fn send_cells(&mut self, cells: &[Vec<u8>]) {
        let Some(socket) = &self.socket else { return };
        let groups: Vec<&[Vec<u8>]> = cells.chunks(CELLS_PER_DATAGRAM).collect();
        for (index, group) in groups.iter().enumerate() {
            let marker = index + 1 == groups.len();
            let mut datagram =
                BytesMut::with_capacity(12 + group.len() * TS_PACKET_SIZE);
            write_rtp_header(
                &mut datagram,
                marker,
                PAYLOAD_TYPE_MP2T,
                self.sequence,
                self.timestamp,
                self.ssrc,
            );
            for cell in *group {
                datagram.put_slice(cell);
            }
            self.sequence = self.sequence.wrapping_add(1);
            if let Err(err) = socket.send(&datagram) {
                warn!(%err, "RTP/TS send failed");
            }
        }
    }
}

impl CodedSink for TsRtpSink {
    fn name(&self) -> &'static str {
        "rtp-ts"
    }

    fn deliver(&mut self, data: &[u8], is_keyframe: bool) {
        if self.socket.is_none() {
            return;
        }

        let mut cells: Vec<Vec<u8>> = Vec::new();
        if is_keyframe {
            cells.push(psi_cell(PAT_PID, &pat_section(), &mut self.cc_pat));
            cells.push(psi_cell(PMT_PID, &pmt_section(), &mut self.cc_pmt));
        }

        let pes = pes_packet(data, self.pts);
        let mut remaining = pes.as_slice();
        let mut first = true;
        while !remaining.is_empty() {
            let pcr = (first && is_keyframe).then_some(self.pts);
            let (cell, consumed) =
                video_cell(&mut self.cc_video, first, pcr, remaining);
            cells.push(cell);
            remaining = &remaining[consumed..];
            first = false;
        }

        self.send_cells(&cells);
        self.pts = self.pts.wrapping_add(self.pts_step) & 0x1_FFFF_FFFF;
        self.timestamp = self.timestamp.wrapping_add(self.timestamp_step);
    }
}

fn open_socket(address: &str, port: u16, dscp: u32) -> std::io::Result<UdpSocket> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect((address, port))?;
    set_dscp(&socket, dscp);
    Ok(socket)
}

/// Wrap one access unit in a PES packet with a PTS header. The packet
/// length field is left zero, as permitted for video elementary streams.
fn pes_packet(payload: &[u8], pts: u64) -> Vec<u8> {
    let mut pes = Vec::with_capacity(14 + payload.len());
    pes.extend_from_slice(&[0x00, 0x00, 0x01, 0xE0]);
    pes.extend_from_slice(&[0x00, 0x00]); // PES_packet_length: unbounded
    pes.push(0x80); // marker bits, no scrambling
    pes.push(0x80); // PTS present
    pes.push(5); // PES_header_data_length
    pes.push(0b0010_0000 | (((pts >> 30) & 0x7) as u8) << 1 | 1);
    pes.push(((pts >> 22) & 0xFF) as u8);
    pes.push((((pts >> 15) & 0x7F) as u8) << 1 | 1);
    pes.push(((pts >> 7) & 0xFF) as u8);
    pes.push(((pts & 0x7F) as u8) << 1 | 1);
    pes.extend_from_slice(payload);
    pes
}

fn encode_pcr(base: u64) -> [u8; 6] {
    [
        (base >> 25) as u8,
        (base >> 17) as u8,
        (base >> 9) as u8,
        (base >> 1) as u8,
        ((base & 1) as u8) << 7 | 0x7E, // reserved bits set, extension 0
        0x00,
    ]
}

fn cell_header(cell: &mut Vec<u8>, pid: u16, pusi: bool, has_adaptation: bool, cc: u8) {
    cell.push(SYNC_BYTE);
    cell.push(u8::from(pusi) << 6 | ((pid >> 8) & 0x1F) as u8);
    cell.push((pid & 0xFF) as u8);
    let ctrl = if has_adaptation { 0b11 } else { 0b01 };
    cell.push(ctrl << 4 | (cc & 0x0F));
}

/// Build one video cell from the front of `data`, stuffing through the
/// adaptation field when less than a full payload remains. Returns the
/// cell and the number of payload bytes consumed.
fn video_cell(cc: &mut u8, pusi: bool, pcr: Option<u64>, data: &[u8]) -> (Vec<u8>, usize) {
    let mut af_body: Vec<u8> = Vec::new();
    if let Some(base) = pcr {
        af_body.push(0x50); // random_access_indicator + PCR_flag
        af_body.extend_from_slice(&encode_pcr(base));
    }

    let mut capacity = if af_body.is_empty() {
        TS_PACKET_SIZE - 4
    } else {
        TS_PACKET_SIZE - 4 - 1 - af_body.len()
    };
    let mut take = data.len().min(capacity);

    if take < capacity {
        let deficit = capacity - take;
        if af_body.is_empty() {
            if deficit == 1 {
                // A bare zero-length adaptation field eats exactly one
                // byte.
                capacity -= 1;
            } else {
                af_body.push(0x00); // no flags
                af_body.resize(deficit - 1, 0xFF);
                capacity = TS_PACKET_SIZE - 4 - 1 - af_body.len();
            }
        } else {
            af_body.resize(af_body.len() + deficit, 0xFF);
            capacity -= deficit;
        }
        take = data.len().min(capacity);
    }

    let has_adaptation = !af_body.is_empty() || capacity == TS_PACKET_SIZE - 5;
    let mut cell = Vec::with_capacity(TS_PACKET_SIZE);
    cell_header(&mut cell, VIDEO_PID, pusi, has_adaptation, *cc);
    *cc = (*cc + 1) & 0x0F;
    if has_adaptation {
        cell.push(af_body.len() as u8);
        cell.extend_from_slice(&af_body);
    }
    cell.extend_from_slice(&data[..take]);
    debug_assert_eq!(cell.len(), TS_PACKET_SIZE);
    (cell, take)
}

/// Wrap a PSI section into a single cell with a pointer field and 0xFF
/// stuffing.
fn psi_cell(pid: u16, section: &[u8], cc: &mut u8) -> Vec<u8> {
    let mut cell = Vec::with_capacity(TS_PACKET_SIZE);
    cell_header(&mut cell, pid, true, false, *cc);
    *cc = (*cc + 1) & 0x0F;
    cell.push(0x00); // pointer_field
    cell.extend_from_slice(section);
    cell.resize(TS_PACKET_SIZE, 0xFF);
    cell
}

fn crc32_mpeg2(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= u32::from(byte) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04C1_1DB7
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn finish_section(mut section: Vec<u8>) -> Vec<u8> {
    let crc = crc32_mpeg2(&section);
    section.extend_from_slice(&crc.to_be_bytes());
    section
}

fn pat_section() -> Vec<u8> {
    let mut s = Vec::new();
    s.push(0x00); // table_id: PAT
    s.extend_from_slice(&[0xB0, 13]); // syntax + length
    s.extend_from_slice(&[0x00, 0x01]); // transport_stream_id
    s.push(0xC1); // version 0, current
    s.push(0x00); // section_number
    s.push(0x00); // last_section_number
    s.extend_from_slice(&[0x00, 0x01]); // program_number 1
    s.push(0xE0 | ((PMT_PID >> 8) & 0x1F) as u8);
    s.push((PMT_PID & 0xFF) as u8);
    finish_section(s)
}

fn pmt_section() -> Vec<u8> {
    let mut s = Vec::new();
    s.push(0x02); // table_id: PMT
    s.extend_from_slice(&[0xB0, 18]); // syntax + length
    s.extend_from_slice(&[0x00, 0x01]); // program_number
    s.push(0xC1);
    s.push(0x00);
    s.push(0x00);
    s.push(0xE0 | ((VIDEO_PID >> 8) & 0x1F) as u8); // PCR PID
    s.push((VIDEO_PID & 0xFF) as u8);
    s.extend_from_slice(&[0xF0, 0x00]); // program_info_length 0
    s.push(STREAM_TYPE_H264);
    s.push(0xE0 | ((VIDEO_PID >> 8) & 0x1F) as u8);
    s.push((VIDEO_PID & 0xFF) as u8);
    s.extend_from_slice(&[0xF0, 0x00]); // ES_info_length 0
    finish_section(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_pair() -> (TsRtpSink, UdpSocket) {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = receiver.local_addr().unwrap().port();
        receiver
            .set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();
        let sink = TsRtpSink::new("127.0.0.1", port, 0, 30);
        (sink, receiver)
    }

    fn recv_all_cells(receiver: &UdpSocket) -> Vec<Vec<u8>> {
        let mut cells = Vec::new();
        loop {
            let mut buf = vec![0u8; 2048];
            let n = receiver.recv(&mut buf).unwrap();
            buf.truncate(n);
            let marker = buf[1] >> 7 == 1;
            let payload = &buf[12..];
            assert_eq!(payload.len() % TS_PACKET_SIZE, 0);
            assert!(payload.len() / TS_PACKET_SIZE <= CELLS_PER_DATAGRAM);
            for cell in payload.chunks(TS_PACKET_SIZE) {
                cells.push(cell.to_vec());
            }
            if marker {
                return cells;
            }
        }
    }

    fn pid_of(cell: &[u8]) -> u16 {
        u16::from(cell[1] & 0x1F) << 8 | u16::from(cell[2])
    }

    #[test]
    fn test_keyframe_leads_with_pat_pmt() {
        let (mut sink, receiver) = local_pair();
        let au = [0x00, 0x00, 0x00, 0x01, 0x65, 0xAA];
        sink.deliver(&au, true);

        let cells = recv_all_cells(&receiver);
        assert!(cells.iter().all(|c| c[0] == SYNC_BYTE));
        assert_eq!(pid_of(&cells[0]), PAT_PID);
        assert_eq!(pid_of(&cells[1]), PMT_PID);
        assert_eq!(pid_of(&cells[2]), VIDEO_PID);
        // payload_unit_start on the first video cell.
        assert_eq!(cells[2][1] >> 6 & 1, 1);
    }

    #[test]
    fn test_pes_header_carries_pts() {
        let pes = pes_packet(&[0xAB], 0x1234);
        assert_eq!(&pes[..4], &[0x00, 0x00, 0x01, 0xE0]);
        assert_eq!(pes[8], 5);
        // Decode the 33-bit PTS back out of the marker-bit layout.
        let pts = (u64::from(pes[9] >> 1 & 0x7) << 30)
            | (u64::from(pes[10]) << 22)
            | (u64::from(pes[11] >> 1) << 15)
            | (u64::from(pes[12]) << 7)
            | u64::from(pes[13] >> 1);
        assert_eq!(pts, 0x1234);
        assert_eq!(pes[14], 0xAB);
    }

    #[test]
    fn test_non_keyframe_has_no_psi() {
        let (mut sink, receiver) = local_pair();
        let au = [0x00, 0x00, 0x00, 0x01, 0x41, 0x9A];
        sink.deliver(&au, false);
        let cells = recv_all_cells(&receiver);
        assert!(cells.iter().all(|c| pid_of(c) == VIDEO_PID));
    }

    #[test]
    fn test_continuity_counters_increment() {
        let (mut sink, receiver) = local_pair();
        let au: Vec<u8> = [0x00, 0x00, 0x00, 0x01, 0x41]
            .iter()
            .copied()
            .chain(std::iter::repeat(0x55).take(1000))
            .collect();
        sink.deliver(&au, false);
        let cells = recv_all_cells(&receiver);
        assert!(cells.len() > 1);
        let counters: Vec<u8> = cells.iter().map(|c| c[3] & 0x0F).collect();
        for pair in counters.windows(2) {
            assert_eq!(pair[1], (pair[0] + 1) & 0x0F);
        }
    }

    #[test]
    fn test_large_au_fills_whole_cells() {
        let (mut sink, receiver) = local_pair();
        let au: Vec<u8> = std::iter::repeat(0x42).take(4000).collect();
        sink.deliver(&au, false);
        let cells = recv_all_cells(&receiver);
        // All but the last video cell must be full payload cells.
        for cell in &cells[..cells.len() - 1] {
            assert_eq!(cell[3] >> 4 & 0x3, 0b01, "unexpected adaptation field");
        }
        assert_eq!(cells.iter().map(Vec::len).sum::<usize>() % TS_PACKET_SIZE, 0);
    }

    #[test]
    fn test_psi_sections_crc() {
        // Byte layout is fixed, so the CRC must be stable.
        let pat = pat_section();
        assert_eq!(pat.len(), 3 + 13);
        let body_crc = crc32_mpeg2(&pat[..pat.len() - 4]);
        assert_eq!(&pat[pat.len() - 4..], &body_crc.to_be_bytes()[..]);

        let pmt = pmt_section();
        assert_eq!(pmt.len(), 3 + 18);
        assert_eq!(pmt[0], 0x02);
    }

    #[test]
    fn test_disabled_sink_is_noop() {
        let mut sink = TsRtpSink::disabled();
        sink.deliver(&[0x00, 0x00, 0x00, 0x01, 0x65, 0x01], true);
    }

    #[test]
    fn test_video_cell_stuffing_yields_exact_cells() {
        let mut cc = 0u8;
        // Tiny payload forces a stuffed adaptation field.
        let (cell, consumed) = video_cell(&mut cc, true, None, &[1, 2, 3]);
        assert_eq!(cell.len(), TS_PACKET_SIZE);
        assert_eq!(consumed, 3);
        assert_eq!(&cell[TS_PACKET_SIZE - 3..], &[1, 2, 3]);

        // Payload one byte short of full gets the single-byte field.
        let data = vec![0x11u8; TS_PACKET_SIZE - 5];
        let (cell, consumed) = video_cell(&mut cc, false, None, &data);
        assert_eq!(cell.len(), TS_PACKET_SIZE);
        assert_eq!(consumed, data.len());
        assert_eq!(cell[4], 0); // zero-length adaptation field

        // Full payload, no adaptation.
        let data = vec![0x22u8; 400];
        let (cell, consumed) = video_cell(&mut cc, false, None, &data);
        assert_eq!(cell.len(), TS_PACKET_SIZE);
        assert_eq!(consumed, 184);
    }
}

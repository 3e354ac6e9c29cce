use byteorder::{ByteOrder, LittleEndian};

/// `struct pcap_file_header`, 24 bytes, little-endian.
pub const GLOBAL_HEADER_LEN: usize = 24;
/// `struct pcap_sf_pkthdr`, 16 bytes, little-endian.
pub const PACKET_HEADER_LEN: usize = 16;

const MAGIC: u32 = 0xa1b2_c3d4;
const VERSION_MAJOR: u16 = 2;
const VERSION_MINOR: u16 = 4;

pub fn global_header(snaplen: u32, linktype: u32) -> [u8; GLOBAL_HEADER_LEN] {
    let mut buf = [0u8; GLOBAL_HEADER_LEN];
    LittleEndian::write_u32(&mut buf[0..4], MAGIC);
    LittleEndian::write_u16(&mut buf[4..6], VERSION_MAJOR);
    LittleEndian::write_u16(&mut buf[6..8], VERSION_MINOR);
    LittleEndian::write_i32(&mut buf[8..12], 0); // thiszone
    LittleEndian::write_u32(&mut buf[12..16], 0); // sigfigs
    LittleEndian::write_u32(&mut buf[16..20], snaplen);
    LittleEndian::write_u32(&mut buf[20..24], linktype);
    buf
}

/// One packet record header: capture timestamp, captured length, and
/// original on-wire length.
pub struct PacketHeader {
    pub ts_sec: u32,
    pub ts_usec: u32,
    pub caplen: u32,
    pub len: u32,
}

pub fn encode_packet_header(h: &PacketHeader) -> [u8; PACKET_HEADER_LEN] {
    let mut buf = [0u8; PACKET_HEADER_LEN];
    LittleEndian::write_u32(&mut buf[0..4], h.ts_sec);
    LittleEndian::write_u32(&mut buf[4..8], h.ts_usec);
    LittleEndian::write_u32(&mut buf[8..12], h.caplen);
    LittleEndian::write_u32(&mut buf[12..16], h.len);
    buf
}

//! Split-packet reassembly for Source Query responses.
//!
//! A response too large for one datagram arrives as fragments, each opening
//! with the `-2` outer header followed by:
//!
//! ```text
//! int32  split-id      bit 31 set = payload is bzip2-compressed
//! uint8  total         fragment count
//! uint8  number        zero-based fragment index
//! uint16 size          fragment body size
//! [ int32 decompressed-size, int32 crc32 ]   fragment 0 of a compressed
//!                                            group only
//! bytes  payload
//! ```
//!
//! Fragments of one response share a split-id. Arrival order does not
//! affect the reassembled bytes; the buffer concatenates slots in index
//! order once all have filled. Compressed groups are inflated to exactly
//! the advertised size and CRC-checked before they are released.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use bzip2::read::BzDecoder;
use crc::{CRC_32_ISO_HDLC, Crc};

use crate::error::CodecError;

const COMPRESSED_BIT: u32 = 0x8000_0000;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Parsed header of one split-packet fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitHeader {
    /// Group id with the compression bit stripped.
    pub id: i32,
    /// Whether bit 31 of the raw split-id was set.
    pub compressed: bool,
    /// Fragment count for the group.
    pub total: u8,
    /// Zero-based index of this fragment.
    pub number: u8,
    /// Per-fragment body size.
    pub size: u16,
    /// Inflated payload length; fragment 0 of a compressed group only.
    pub decompressed_size: Option<u32>,
    /// CRC32 of the inflated payload; fragment 0 of a compressed group only.
    pub crc32: Option<u32>,
}

impl SplitHeader {
    /// Parse a fragment header from the bytes after the `-2` outer header.
    /// Returns the header and the fragment payload.
    pub fn parse(bytes: &[u8]) -> Result<(SplitHeader, &[u8]), CodecError> {
        let mut cur = Cursor::new(bytes);

        let raw_id = cur
            .read_u32::<LittleEndian>()
            .map_err(|_| CodecError::ShortRead)?;
        let compressed = raw_id & COMPRESSED_BIT != 0;
        let id = (raw_id & !COMPRESSED_BIT) as i32;
        let total = cur.read_u8().map_err(|_| CodecError::ShortRead)?;
        let number = cur.read_u8().map_err(|_| CodecError::ShortRead)?;
        let size = cur
            .read_u16::<LittleEndian>()
            .map_err(|_| CodecError::ShortRead)?;

        let (decompressed_size, crc32) = if compressed && number == 0 {
            let len = cur
                .read_i32::<LittleEndian>()
                .map_err(|_| CodecError::ShortRead)?;
            let crc = cur
                .read_i32::<LittleEndian>()
                .map_err(|_| CodecError::ShortRead)?;
            (Some(len as u32), Some(crc as u32))
        } else {
            (None, None)
        };

        let payload = &bytes[cur.position() as usize..];
        Ok((
            SplitHeader {
                id,
                compressed,
                total,
                number,
                size,
                decompressed_size,
                crc32,
            },
            payload,
        ))
    }
}

/// Collects the fragments of one split group.
///
/// Owned by the session layer's pending table; all access is serialized
/// there, so the buffer itself carries no locks.
#[derive(Debug)]
pub struct ReassemblyBuffer {
    id: i32,
    compressed: bool,
    total: u8,
    fragment_size: u16,
    decompressed_size: Option<u32>,
    crc32: Option<u32>,
    slots: Vec<Option<Vec<u8>>>,
    filled: usize,
}

impl ReassemblyBuffer {
    /// Allocate a buffer from the first fragment seen for a group (not
    /// necessarily fragment number 0).
    pub fn new(header: &SplitHeader) -> Result<Self, CodecError> {
        if header.total == 0 || header.number >= header.total {
            return Err(CodecError::Reassembly);
        }
        Ok(Self {
            id: header.id,
            compressed: header.compressed,
            total: header.total,
            fragment_size: header.size,
            decompressed_size: header.decompressed_size,
            crc32: header.crc32,
            slots: (0..header.total).map(|_| None).collect(),
            filled: 0,
        })
    }

    /// Group id this buffer collects.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Insert one fragment. Returns the reassembled payload once every slot
    /// has filled, `None` while fragments are still outstanding.
    ///
    /// Any metadata mismatch against the group discards the buffer: the
    /// caller must drop it and fail the owning request.
    pub fn insert(
        &mut self,
        header: &SplitHeader,
        payload: &[u8],
    ) -> Result<Option<Vec<u8>>, CodecError> {
        if header.id != self.id
            || header.total != self.total
            || header.compressed != self.compressed
            || header.size != self.fragment_size
            || header.number >= self.total
        {
            return Err(CodecError::Reassembly);
        }

        // Compression metadata rides on fragment 0, which may not have been
        // the fragment that allocated the buffer.
        if header.number == 0 && self.compressed {
            self.decompressed_size = header.decompressed_size;
            self.crc32 = header.crc32;
        }

        let slot = &mut self.slots[header.number as usize];
        match slot {
            Some(existing) if existing.as_slice() == payload => {
                // Datagram re-delivery; nothing new.
                return Ok(None);
            }
            Some(_) => return Err(CodecError::Reassembly),
            None => {
                *slot = Some(payload.to_vec());
                self.filled += 1;
            }
        }

        if self.filled < self.total as usize {
            return Ok(None);
        }

        let mut assembled = Vec::new();
        for slot in &self.slots {
            // Every slot is filled once filled == total.
            if let Some(bytes) = slot {
                assembled.extend_from_slice(bytes);
            }
        }

        if self.compressed {
            assembled = self.inflate(&assembled)?;
        }

        tracing::trace!(
            group = self.id,
            fragments = self.total,
            bytes = assembled.len(),
            compressed = self.compressed,
            "split group reassembled"
        );
        Ok(Some(assembled))
    }

    fn inflate(&self, compressed: &[u8]) -> Result<Vec<u8>, CodecError> {
        let expected_len = self.decompressed_size.ok_or(CodecError::Reassembly)?;
        let expected_crc = self.crc32.ok_or(CodecError::Reassembly)?;

        let mut inflated = Vec::with_capacity(expected_len as usize);
        BzDecoder::new(compressed)
            .read_to_end(&mut inflated)
            .map_err(|_| CodecError::Decompress)?;

        if inflated.len() != expected_len as usize {
            return Err(CodecError::Decompress);
        }
        if CRC32.checksum(&inflated) != expected_crc {
            return Err(CodecError::Checksum);
        }
        Ok(inflated)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use bzip2::Compression;
    use bzip2::write::BzEncoder;
    use proptest::prelude::*;

    use super::*;

    fn fragment(
        raw_id: u32,
        total: u8,
        number: u8,
        size: u16,
        meta: Option<(u32, u32)>,
        payload: &[u8],
    ) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&raw_id.to_le_bytes());
        out.push(total);
        out.push(number);
        out.extend_from_slice(&size.to_le_bytes());
        if let Some((len, crc)) = meta {
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(&crc.to_le_bytes());
        }
        out.extend_from_slice(payload);
        out
    }

    fn feed(buf: &mut ReassemblyBuffer, bytes: &[u8]) -> Result<Option<Vec<u8>>, CodecError> {
        let (header, payload) = SplitHeader::parse(bytes).unwrap();
        buf.insert(&header, payload)
    }

    #[test]
    fn header_strips_compression_bit() {
        let raw = fragment(0x8000_0001, 3, 0, 8, Some((1024, 0xAABB_CCDD)), b"x");
        let (header, payload) = SplitHeader::parse(&raw).unwrap();
        assert_eq!(header.id, 1);
        assert!(header.compressed);
        assert_eq!(header.decompressed_size, Some(1024));
        assert_eq!(header.crc32, Some(0xAABB_CCDD));
        assert_eq!(payload, b"x");
    }

    #[test]
    fn uncompressed_fragment_has_no_metadata() {
        let raw = fragment(7, 2, 0, 4, None, b"abcd");
        let (header, payload) = SplitHeader::parse(&raw).unwrap();
        assert_eq!(header.id, 7);
        assert!(!header.compressed);
        assert_eq!(header.decompressed_size, None);
        assert_eq!(payload, b"abcd");
    }

    #[test]
    fn reassemble_in_order() {
        let frags: Vec<Vec<u8>> = (0..3u8)
            .map(|n| fragment(9, 3, n, 2, None, &[n, n]))
            .collect();
        let (h0, p0) = SplitHeader::parse(&frags[0]).unwrap();
        let mut buf = ReassemblyBuffer::new(&h0).unwrap();
        assert_eq!(buf.insert(&h0, p0).unwrap(), None);
        assert_eq!(feed(&mut buf, &frags[1]).unwrap(), None);
        assert_eq!(
            feed(&mut buf, &frags[2]).unwrap(),
            Some(vec![0, 0, 1, 1, 2, 2])
        );
    }

    #[test]
    fn reassemble_out_of_order() {
        let frags: Vec<Vec<u8>> = (0..3u8)
            .map(|n| fragment(9, 3, n, 2, None, &[n, n]))
            .collect();
        let (h2, p2) = SplitHeader::parse(&frags[2]).unwrap();
        let mut buf = ReassemblyBuffer::new(&h2).unwrap();
        assert_eq!(buf.insert(&h2, p2).unwrap(), None);
        assert_eq!(feed(&mut buf, &frags[0]).unwrap(), None);
        assert_eq!(
            feed(&mut buf, &frags[1]).unwrap(),
            Some(vec![0, 0, 1, 1, 2, 2])
        );
    }

    #[test]
    fn total_mismatch_discards_group() {
        let first = fragment(9, 3, 0, 2, None, b"aa");
        let bad = fragment(9, 4, 1, 2, None, b"bb");
        let (h, p) = SplitHeader::parse(&first).unwrap();
        let mut buf = ReassemblyBuffer::new(&h).unwrap();
        buf.insert(&h, p).unwrap();
        assert!(matches!(feed(&mut buf, &bad), Err(CodecError::Reassembly)));
    }

    #[test]
    fn conflicting_duplicate_discards_group() {
        let first = fragment(9, 2, 0, 2, None, b"aa");
        let dup = fragment(9, 2, 0, 2, None, b"zz");
        let (h, p) = SplitHeader::parse(&first).unwrap();
        let mut buf = ReassemblyBuffer::new(&h).unwrap();
        buf.insert(&h, p).unwrap();
        assert!(matches!(feed(&mut buf, &dup), Err(CodecError::Reassembly)));
    }

    #[test]
    fn identical_duplicate_is_ignored() {
        let first = fragment(9, 2, 0, 2, None, b"aa");
        let (h, p) = SplitHeader::parse(&first).unwrap();
        let mut buf = ReassemblyBuffer::new(&h).unwrap();
        buf.insert(&h, p).unwrap();
        assert_eq!(buf.insert(&h, p).unwrap(), None);
        assert_eq!(
            feed(&mut buf, &fragment(9, 2, 1, 2, None, b"bb")).unwrap(),
            Some(b"aabb".to_vec())
        );
    }

    fn bzip(data: &[u8]) -> Vec<u8> {
        let mut enc = BzEncoder::new(Vec::new(), Compression::best());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn compressed_fragments(payload: &[u8], parts: usize, crc: u32) -> Vec<Vec<u8>> {
        let deflated = bzip(payload);
        let chunk = deflated.len().div_ceil(parts);
        deflated
            .chunks(chunk)
            .enumerate()
            .map(|(n, body)| {
                let meta = (n == 0).then_some((payload.len() as u32, crc));
                fragment(0x8000_0001, parts as u8, n as u8, chunk as u16, meta, body)
            })
            .collect()
    }

    #[test]
    fn compressed_group_inflates_and_verifies() {
        let payload: Vec<u8> = (0..1024u32).map(|i| (i % 251) as u8).collect();
        let crc = CRC32.checksum(&payload);
        let frags = compressed_fragments(&payload, 3, crc);

        // Arrival order {2, 0, 1}.
        let (h2, p2) = SplitHeader::parse(&frags[2]).unwrap();
        let mut buf = ReassemblyBuffer::new(&h2).unwrap();
        assert_eq!(buf.insert(&h2, p2).unwrap(), None);
        assert_eq!(feed(&mut buf, &frags[0]).unwrap(), None);
        let out = feed(&mut buf, &frags[1]).unwrap().unwrap();
        assert_eq!(out.len(), 1024);
        assert_eq!(out, payload);
    }

    #[test]
    fn corrupted_crc_fails_checksum() {
        let payload: Vec<u8> = (0..512u32).map(|i| (i % 127) as u8).collect();
        let frags = compressed_fragments(&payload, 2, 0xAABB_CCDD);
        let (h0, p0) = SplitHeader::parse(&frags[0]).unwrap();
        let mut buf = ReassemblyBuffer::new(&h0).unwrap();
        buf.insert(&h0, p0).unwrap();
        assert!(matches!(
            feed(&mut buf, &frags[1]),
            Err(CodecError::Checksum)
        ));
    }

    #[test]
    fn garbage_compressed_payload_fails_decompress() {
        let first = fragment(0x8000_0002, 2, 0, 4, Some((64, 0)), b"not-");
        let second = fragment(0x8000_0002, 2, 1, 4, None, b"bzip");
        let (h, p) = SplitHeader::parse(&first).unwrap();
        let mut buf = ReassemblyBuffer::new(&h).unwrap();
        buf.insert(&h, p).unwrap();
        assert!(matches!(
            feed(&mut buf, &second),
            Err(CodecError::Decompress)
        ));
    }

    proptest! {
        #[test]
        fn arrival_order_never_changes_output(
            order in Just((0..5usize).collect::<Vec<_>>()).prop_shuffle(),
        ) {
            let frags: Vec<Vec<u8>> = (0..5u8)
                .map(|n| fragment(42, 5, n, 3, None, &[n, n + 1, n + 2]))
                .collect();
            let expected: Vec<u8> = (0..5u8).flat_map(|n| [n, n + 1, n + 2]).collect();

            let (h, p) = SplitHeader::parse(&frags[order[0]]).unwrap();
            let mut buf = ReassemblyBuffer::new(&h).unwrap();
            let mut result = buf.insert(&h, p).unwrap();
            for &i in &order[1..] {
                let (h, p) = SplitHeader::parse(&frags[i]).unwrap();
                result = buf.insert(&h, p).unwrap();
            }
            prop_assert_eq!(result, Some(expected));
        }
    }
}

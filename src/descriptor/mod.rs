//! Descriptors provide metadata about an element of a Transport Stream.
//!
//! For example, a descriptor may carry the name of a service, or the list of services carried by
//! some transport stream.
//!
//! The syntax of specific tables often allows descriptors to be attached to the table itself, or
//! to entries within the table.
//!
//! # Reading and editing
//!
//! Zero-copy access to descriptors within a borrowed buffer is provided by
//! [`DescriptorIter`](struct.DescriptorIter.html), producing values of a type implementing the
//! [`Descriptor`](trait.Descriptor.html) trait (for example [`DvbDescriptors`](enum.DvbDescriptors.html)).
//!
//! Tables which are to be modified and then re-encoded instead hold an owned
//! [`DescriptorList`](struct.DescriptorList.html), which also tracks which
//! _private data specifier_ is in force for each descriptor.
//!
//! ```
//! # use svrename::descriptor::{DescriptorList, DvbDescriptors};
//! let list = DescriptorList::from_bytes(&[0x48, 0x05, 0x01, 0x00, 0x02, b'H', b'i']).unwrap();
//! let i = list.search(0x48, 0, 0).unwrap();
//! if let Ok(DvbDescriptors::Service(svc)) = list.typed::<DvbDescriptors>(i) {
//!     assert_eq!(svc.service_name(), "Hi");
//! }
//! ```

pub mod logical_channel;
pub mod service;
pub mod service_list;

use self::logical_channel::LogicalChannelNumberDescriptor;
use self::service::ServiceDescriptor;
use self::service_list::ServiceListDescriptor;
use std::fmt;
use std::marker;

/// Value of the private data specifier registered to EICTA (formerly EACEM), under which the
/// logical channel number descriptor is defined.
pub const PDS_EICTA: u32 = 0x0000_0028;

pub trait Descriptor<'buf>: Sized {
    fn from_bytes(buf: &'buf [u8]) -> Result<Self, DescriptorError>;
}

#[macro_export]
macro_rules! descriptor_enum {
    (
        $(#[$outer:meta])*
        $name:ident {
            $(
                $(#[$inner:ident $($args:tt)*])*
                $case_name:ident $($tags:pat_param)|* => $t:ident
            ),*,
        }
    ) => {
        $(#[$outer])*
        pub enum $name<'buf> {
            $(
                $(#[$inner $($args)*])*
                $case_name($t<'buf>),
            )*
        }
        impl<'buf> $crate::descriptor::Descriptor<'buf> for $name<'buf> {
            fn from_bytes(buf: &'buf[u8]) -> Result<Self, $crate::descriptor::DescriptorError> {
                if buf.len() <  2 {
                    return Err($crate::descriptor::DescriptorError::BufferTooShort{ buflen: buf.len() })
                }
                let tag = buf[0];
                let len = buf[1] as usize;
                let tag_end = len + 2;
                if tag_end > buf.len() {
                    return Err($crate::descriptor::DescriptorError::TagTooLongForBuffer{ taglen: len, buflen: buf.len() })
                }
                let payload = &buf[2..tag_end];
                match tag {
                    $( $( $tags )|* => Ok($name::$case_name($t::new(tag, payload)?)), )*
                    #[allow(unreachable_patterns)]
                    _ => Err($crate::descriptor::DescriptorError::UnhandledTagValue(tag)),
                }
            }
        }
    }
}

pub struct UnknownDescriptor<'buf> {
    pub tag: u8,
    pub payload: &'buf [u8],
}
impl<'buf> UnknownDescriptor<'buf> {
    pub fn new(tag: u8, payload: &'buf [u8]) -> Result<UnknownDescriptor<'buf>, DescriptorError> {
        Ok(UnknownDescriptor { tag, payload })
    }
}
impl<'buf> Descriptor<'buf> for UnknownDescriptor<'buf> {
    fn from_bytes(buf: &'buf [u8]) -> Result<Self, DescriptorError> {
        if buf.len() < 2 {
            return Err(DescriptorError::BufferTooShort { buflen: buf.len() });
        }
        let len = buf[1] as usize;
        if len + 2 > buf.len() {
            return Err(DescriptorError::TagTooLongForBuffer {
                taglen: len,
                buflen: buf.len(),
            });
        }
        UnknownDescriptor::new(buf[0], &buf[2..len + 2])
    }
}
impl<'buf> fmt::Debug for UnknownDescriptor<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("UnknownDescriptor")
            .field("tag", &self.tag)
            .field("len", &self.payload.len())
            .finish()
    }
}

/// Announces the owner of any private descriptors (tags `0x80` and above) that follow it within
/// the same descriptor loop.
pub struct PrivateDataSpecifierDescriptor<'buf> {
    buf: &'buf [u8],
}
impl<'buf> PrivateDataSpecifierDescriptor<'buf> {
    pub const TAG: u8 = 0x5f;
    pub fn new(
        _tag: u8,
        buf: &'buf [u8],
    ) -> Result<PrivateDataSpecifierDescriptor<'buf>, DescriptorError> {
        if buf.len() < 4 {
            Err(DescriptorError::NotEnoughData {
                tag: Self::TAG,
                actual: buf.len(),
                expected: 4,
            })
        } else {
            Ok(PrivateDataSpecifierDescriptor { buf })
        }
    }

    pub fn private_data_specifier(&self) -> u32 {
        u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]])
    }
}
impl<'buf> fmt::Debug for PrivateDataSpecifierDescriptor<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("PrivateDataSpecifierDescriptor")
            .field(
                "private_data_specifier",
                &format_args!("{:#010x}", self.private_data_specifier()),
            )
            .finish()
    }
}

descriptor_enum! {
    /// The descriptors of _ETSI EN 300 468_ that this crate interprets.  Tag `0x83` is only a
    /// logical channel number descriptor when found under the EICTA private data specifier; use
    /// [`DescriptorList::search()`](struct.DescriptorList.html#method.search) to check that first.
    #[derive(Debug)]
    DvbDescriptors {
        ServiceList 0x41 => ServiceListDescriptor,
        Service 0x48 => ServiceDescriptor,
        PrivateDataSpecifier 0x5f => PrivateDataSpecifierDescriptor,
        LogicalChannelNumber 0x83 => LogicalChannelNumberDescriptor,
        Other 0..=0x40 | 0x42..=0x47 | 0x49..=0x5e | 0x60..=0x82 | 0x84..=0xff => UnknownDescriptor,
    }
}

pub struct DescriptorIter<'buf, Desc>
where
    Desc: Descriptor<'buf>,
{
    buf: &'buf [u8],
    phantom: marker::PhantomData<Desc>,
}
impl<'buf, Desc> DescriptorIter<'buf, Desc>
where
    Desc: Descriptor<'buf>,
{
    pub fn new(buf: &'buf [u8]) -> DescriptorIter<'buf, Desc> {
        DescriptorIter {
            buf,
            phantom: marker::PhantomData,
        }
    }
}
impl<'buf, Desc> Iterator for DescriptorIter<'buf, Desc>
where
    Desc: Descriptor<'buf>,
{
    type Item = Result<Desc, DescriptorError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }
        if self.buf.len() < 2 {
            let buflen = self.buf.len();
            self.buf = &self.buf[0..0];
            return Some(Err(DescriptorError::BufferTooShort { buflen }));
        }
        let tag = self.buf[0];
        let len = self.buf[1] as usize;
        let remaining_size = self.buf.len() - 2;
        if len > remaining_size {
            // ensure anther call to next() will yield None,
            self.buf = &self.buf[0..0];
            Some(Err(DescriptorError::NotEnoughData {
                tag,
                actual: remaining_size,
                expected: len,
            }))
        } else {
            let (desc, rest) = self.buf.split_at(len + 2);
            self.buf = rest;
            Some(Descriptor::from_bytes(desc))
        }
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("descriptor with tag {tag:#04x} declares {expected} bytes, but only {actual} remain")]
    NotEnoughData {
        tag: u8,
        actual: usize,
        expected: usize,
    },
    #[error("descriptor length {taglen} is too long for a buffer of {buflen} bytes")]
    TagTooLongForBuffer { taglen: usize, buflen: usize },
    #[error("buffer of {buflen} bytes is too short to hold a descriptor")]
    BufferTooShort { buflen: usize },
    #[error("unhandled descriptor tag {0:#04x}")]
    UnhandledTagValue(u8),
    #[error("descriptor payload of {0} bytes exceeds the 255 byte limit")]
    PayloadTooLong(usize),
    #[error("no descriptor at index {0}")]
    NoSuchIndex(usize),
}

/// An owned, editable sequence of descriptors, as found in one descriptor loop of a table.
///
/// Each descriptor is kept in its encoded form (tag, length and payload).  Payloads may be edited
/// in place through [`payload_mut()`](#method.payload_mut), which cannot change their length.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DescriptorList {
    entries: Vec<Vec<u8>>,
}

impl DescriptorList {
    /// Splits a descriptor loop into its descriptors.  Fails if the final descriptor's length runs
    /// past the end of the buffer.
    pub fn from_bytes(buf: &[u8]) -> Result<DescriptorList, DescriptorError> {
        let entries = DescriptorIter::<UnknownDescriptor>::new(buf)
            .map(|d| d.map(|d| Self::encode(d.tag, d.payload)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DescriptorList { entries })
    }

    fn encode(tag: u8, payload: &[u8]) -> Vec<u8> {
        let mut raw = Vec::with_capacity(payload.len() + 2);
        raw.push(tag);
        raw.push(payload.len() as u8);
        raw.extend_from_slice(payload);
        raw
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Panics if `index` is out of bounds.
    pub fn tag(&self, index: usize) -> u8 {
        self.entries[index][0]
    }

    /// Panics if `index` is out of bounds.
    pub fn payload(&self, index: usize) -> &[u8] {
        &self.entries[index][2..]
    }

    /// Mutable access to the payload of a descriptor.  The length of the payload is fixed.
    ///
    /// Panics if `index` is out of bounds.
    pub fn payload_mut(&mut self, index: usize) -> &mut [u8] {
        &mut self.entries[index][2..]
    }

    /// The complete encoding of one descriptor, including tag and length.
    ///
    /// Panics if `index` is out of bounds.
    pub fn raw(&self, index: usize) -> &[u8] {
        &self.entries[index][..]
    }

    /// Interpret the descriptor at `index` as the given descriptor type.
    pub fn typed<'a, D: Descriptor<'a>>(&'a self, index: usize) -> Result<D, DescriptorError> {
        let raw = self
            .entries
            .get(index)
            .ok_or(DescriptorError::NoSuchIndex(index))?;
        D::from_bytes(&raw[..])
    }

    /// The private data specifier in force for the descriptor at `index`, given by the closest
    /// private data specifier descriptor at or before it, or `0` if there is none.
    ///
    /// Panics if `index` is out of bounds.
    pub fn private_data_specifier(&self, index: usize) -> u32 {
        self.entries[..=index]
            .iter()
            .rev()
            .filter(|raw| raw[0] == PrivateDataSpecifierDescriptor::TAG)
            .find_map(|raw| PrivateDataSpecifierDescriptor::new(raw[0], &raw[2..]).ok())
            .map(|pds| pds.private_data_specifier())
            .unwrap_or(0)
    }

    /// Finds the first descriptor at or after `start` having the given tag.  Private descriptors
    /// (tag `0x80` and above) only match when the private data specifier in force for them is
    /// `pds`.
    pub fn search(&self, tag: u8, start: usize, pds: u32) -> Option<usize> {
        (start..self.entries.len()).find(|&i| {
            self.tag(i) == tag && (tag < 0x80 || self.private_data_specifier(i) == pds)
        })
    }

    /// Appends a new descriptor to the end of the list.
    pub fn add(&mut self, tag: u8, payload: &[u8]) -> Result<(), DescriptorError> {
        if payload.len() > 255 {
            return Err(DescriptorError::PayloadTooLong(payload.len()));
        }
        self.entries.push(Self::encode(tag, payload));
        Ok(())
    }

    /// Substitutes the payload of an existing descriptor, which may change its length.
    pub fn replace_payload(&mut self, index: usize, payload: &[u8]) -> Result<(), DescriptorError> {
        if payload.len() > 255 {
            return Err(DescriptorError::PayloadTooLong(payload.len()));
        }
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(DescriptorError::NoSuchIndex(index))?;
        let tag = entry[0];
        *entry = Self::encode(tag, payload);
        Ok(())
    }

    /// Number of bytes taken by the encoded list.
    pub fn binary_size(&self) -> usize {
        self.entries.iter().map(|e| e.len()).sum()
    }

    /// Appends the encoded descriptors to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        for e in &self.entries {
            out.extend_from_slice(e);
        }
    }

    /// Encodes the list as one or more descriptor loops of at most `max` bytes, breaking only
    /// between descriptors.  An empty list gives one empty loop.
    pub fn split_loops(&self, max: usize) -> Vec<Vec<u8>> {
        let mut loops = vec![];
        let mut current = vec![];
        for e in &self.entries {
            if !current.is_empty() && current.len() + e.len() > max {
                loops.push(std::mem::take(&mut current));
            }
            current.extend_from_slice(e);
        }
        loops.push(current);
        loops
    }

    /// Appends the 12-bit loop length (behind 4 reserved bits) and the encoded descriptors to
    /// `out`.
    pub fn write_with_length(&self, out: &mut Vec<u8>) {
        let len = self.binary_size() as u16 & 0x0fff;
        out.extend_from_slice(&(0xf000 | len).to_be_bytes());
        self.write_to(out);
    }
}

impl fmt::Debug for DescriptorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_list()
            .entries(
                self.entries
                    .iter()
                    .map(|raw| DvbDescriptors::from_bytes(&raw[..])),
            )
            .finish()
    }
}

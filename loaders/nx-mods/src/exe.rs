//! Executable metadata contract
//!
//! The patch pipeline never inspects executable container formats (NSO/NRO
//! framing, section compression). Loaders hand it an already-flattened image
//! plus section geometry and a build id through [`NxExecutable`];
//! [`ProgramImage`] is the plain owned implementation of that contract.

/// A contiguous region of an executable image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Offset of the region from the start of the image
    pub offset: usize,
    /// Size of the region in bytes
    pub size: usize,
}

/// Contract between executable loaders and the patch pipeline
///
/// Implementations expose a mutable flat image, the four standard section
/// descriptors, and the raw build id bytes. All build-id matching goes
/// through [`trimmed_build_id`], never the raw bytes.
pub trait NxExecutable {
    /// The flat executable image
    fn program(&self) -> &[u8];

    /// The flat executable image, mutable for patching
    fn program_mut(&mut self) -> &mut [u8];

    /// Raw build id bytes as stored in the executable
    fn build_id(&self) -> &[u8];

    /// Code section
    fn text(&self) -> Segment;

    /// Read-only data section
    fn ro(&self) -> Segment;

    /// Initialized data section
    fn data(&self) -> Segment;

    /// Uninitialized data section
    fn bss(&self) -> Segment;
}

/// Render a raw build id for matching: uppercase hex, trailing zero
/// nibbles trimmed
///
/// Trimming lets patches authored against a shortened declared id match an
/// executable whose stored id is zero-padded to full width.
///
/// # Examples
///
/// ```
/// use nx_mods::exe::trimmed_build_id;
///
/// assert_eq!(trimmed_build_id(&[0xAB, 0xCD, 0x00, 0x00]), "ABCD");
/// assert_eq!(trimmed_build_id(&[0xAB, 0xC0, 0x00, 0x00]), "ABC");
/// ```
pub fn trimmed_build_id(raw: &[u8]) -> String {
    let mut id = hex::encode_upper(raw);
    let trimmed = id.trim_end_matches('0').len();
    id.truncate(trimmed);
    id
}

/// An owned, already-decompressed executable image
#[derive(Debug, Clone)]
pub struct ProgramImage {
    program: Vec<u8>,
    build_id: Vec<u8>,
    text: Segment,
    ro: Segment,
    data: Segment,
    bss: Segment,
}

impl ProgramImage {
    /// Wrap a flattened image with its section geometry and build id
    pub fn new(
        program: Vec<u8>,
        build_id: Vec<u8>,
        text: Segment,
        ro: Segment,
        data: Segment,
        bss: Segment,
    ) -> Self {
        Self {
            program,
            build_id,
            text,
            ro,
            data,
            bss,
        }
    }

    /// Consume the image, returning the patched bytes
    pub fn into_program(self) -> Vec<u8> {
        self.program
    }
}

impl NxExecutable for ProgramImage {
    fn program(&self) -> &[u8] {
        &self.program
    }

    fn program_mut(&mut self) -> &mut [u8] {
        &mut self.program
    }

    fn build_id(&self) -> &[u8] {
        &self.build_id
    }

    fn text(&self) -> Segment {
        self.text
    }

    fn ro(&self) -> Segment {
        self.ro
    }

    fn data(&self) -> Segment {
        self.data
    }

    fn bss(&self) -> Segment {
        self.bss
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_removes_trailing_zero_nibbles() {
        assert_eq!(trimmed_build_id(&[0x12, 0x34, 0x50, 0x00]), "12345");
        assert_eq!(trimmed_build_id(&[0x00, 0x00]), "");
    }

    #[test]
    fn test_trim_keeps_interior_zeros() {
        assert_eq!(trimmed_build_id(&[0x10, 0x02]), "1002");
    }

    #[test]
    fn test_program_image_accessors() {
        let mut image = ProgramImage::new(
            vec![0u8; 32],
            vec![0xAB, 0xCD],
            Segment { offset: 0, size: 16 },
            Segment { offset: 16, size: 8 },
            Segment { offset: 24, size: 8 },
            Segment { offset: 32, size: 4 },
        );

        assert_eq!(image.program().len(), 32);
        assert_eq!(trimmed_build_id(image.build_id()), "ABCD");
        image.program_mut()[0] = 0xFF;
        assert_eq!(image.program()[0], 0xFF);
        assert_eq!(image.text().size, 16);
        assert_eq!(image.bss().offset, 32);
    }
}

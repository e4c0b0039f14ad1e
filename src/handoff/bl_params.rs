// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Parsing of the `bl_params_t` image list passed from BL2.

use super::{BootTargetInfo, context::Spsr};
use crate::error::{Corruption, Error};
use core::{ffi::c_void, ptr::null};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Header type of a `bl_params_t`.
pub const PARAM_BL_PARAMS: u8 = 0x05;
/// Header type of an `entry_point_info_t`.
pub const PARAM_EP: u8 = 0x01;
/// First version of the parameter list with a linked list of image nodes.
pub const VERSION_2: u8 = 0x02;
/// Entry point attribute for an image running in the non-secure world.
pub const EP_NON_SECURE: u32 = 0x1;

/// Images which can be described by BL2.
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum ImageId {
    /// The secure payload, i.e. SP_MIN itself.
    Bl32 = 4,
    /// The non-secure bootloader.
    Bl33 = 5,
}

/// `param_header_t`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(C)]
pub struct ParamHeader {
    /// Type of the structure following the header.
    pub kind: u8,
    /// Version of the structure.
    pub version: u8,
    /// Size of the structure in bytes, including the header.
    pub size: u16,
    /// Attribute bits.
    pub attr: u32,
}

/// `entry_point_info_t`, in its AArch32 layout.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(C)]
pub struct EntryPointInfo {
    /// Header, of type [`PARAM_EP`].
    pub header: ParamHeader,
    /// Entry point address.
    pub pc: usize,
    /// Processor state to enter with.
    pub spsr: u32,
    /// Supervisor mode link register.
    pub lr_svc: usize,
    /// r0 to r3.
    pub args: [usize; 4],
}

impl EntryPointInfo {
    /// Returns the descriptor for entering the non-secure world at the resolved `target`.
    ///
    /// The attribute bits and `lr_svc` BL2 passed for BL33 are kept, with the non-secure bit
    /// always set.
    pub fn non_secure(target: &BootTargetInfo) -> Self {
        Self {
            header: ParamHeader {
                kind: PARAM_EP,
                version: VERSION_2,
                size: size_of::<Self>() as u16,
                attr: target.attr() | EP_NON_SECURE,
            },
            pc: target.pc(),
            spsr: target.spsr().bits(),
            lr_svc: target.lr_svc(),
            args: target.args(),
        }
    }
}

/// `bl_params_node_t`.
#[derive(Debug)]
#[repr(C)]
pub struct BlParamsNode {
    /// Raw [`ImageId`].
    pub image_id: u32,
    /// `image_info_t`, unused here.
    pub image_info: *const c_void,
    /// Entry point of the image, may be null.
    pub ep_info: *const EntryPointInfo,
    /// Next node, or null.
    pub next: *const BlParamsNode,
}

/// `bl_params_t`.
#[derive(Debug)]
#[repr(C)]
pub struct BlParams {
    /// Header, of type [`PARAM_BL_PARAMS`].
    pub header: ParamHeader,
    /// First node of the list, or null.
    pub head: *const BlParamsNode,
}

/// The parts of an image descriptor needed to enter the image.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ImageDescriptor {
    /// Raw image id.
    pub image_id: u32,
    /// Attribute bits of the entry point header.
    pub attr: u32,
    /// Entry point address.
    pub pc: usize,
    /// Processor state to enter with.
    pub spsr: Spsr,
    /// Supervisor mode link register.
    pub lr_svc: usize,
    /// r0 to r3.
    pub args: [usize; 4],
}

/// Iterator over the images of a `bl_params_t` list.
pub struct Images<'a> {
    node: Option<&'a BlParamsNode>,
}

impl<'a> Iterator for Images<'a> {
    type Item = ImageDescriptor;

    fn next(&mut self) -> Option<ImageDescriptor> {
        while let Some(node) = self.node {
            // SAFETY: The caller of `images` promised that all nodes are valid for `'a`.
            self.node = unsafe { node.next.as_ref() };
            // SAFETY: As above, for the entry point descriptors.
            if let Some(ep_info) = unsafe { node.ep_info.as_ref() } {
                return Some(ImageDescriptor {
                    image_id: node.image_id,
                    attr: ep_info.header.attr,
                    pc: ep_info.pc,
                    spsr: Spsr::from_bits_retain(ep_info.spsr),
                    lr_svc: ep_info.lr_svc,
                    args: ep_info.args,
                });
            }
        }
        None
    }
}

impl Images<'_> {
    /// Returns an iterator over no images.
    pub const fn empty() -> Self {
        Self { node: None }
    }
}

/// Checks the header of the list at `params` and returns an iterator over its images.
///
/// Nodes without an entry point are skipped.
///
/// # Safety
///
/// `params` must be null or point to a `bl_params_t` whose nodes and entry point descriptors are
/// valid and not modified for the lifetime `'a`.
pub unsafe fn images<'a>(params: *const BlParams) -> Result<Images<'a>, Error> {
    // SAFETY: Our caller promised `params` is null or valid for `'a`.
    let params = unsafe { params.as_ref() }.ok_or(Corruption::InvalidHandoff)?;
    if params.header.kind != PARAM_BL_PARAMS || params.header.version < VERSION_2 {
        return Err(Corruption::InvalidHandoff.into());
    }
    Ok(Images {
        // SAFETY: Our caller promised the nodes are valid for `'a`.
        node: unsafe { params.head.as_ref() },
    })
}

impl Default for BlParams {
    fn default() -> Self {
        Self {
            header: ParamHeader {
                kind: PARAM_BL_PARAMS,
                version: VERSION_2,
                size: size_of::<Self>() as u16,
                attr: 0,
            },
            head: null(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff::BootHandoff;
    use core::ptr::null_mut;

    /// `EP_ST_ENABLE`, an attribute bit BL2 may set besides the security state.
    const EP_ST_ENABLE: u32 = 0x4;

    fn entry_point(pc: usize) -> EntryPointInfo {
        EntryPointInfo {
            header: ParamHeader {
                kind: PARAM_EP,
                version: VERSION_2,
                size: size_of::<EntryPointInfo>() as u16,
                attr: EP_NON_SECURE | EP_ST_ENABLE,
            },
            pc,
            spsr: 0x1da,
            lr_svc: 0x2ffc_1000,
            args: [1, 2, 3, 4],
        }
    }

    #[test]
    fn non_secure_entry_point() {
        let bl33 = ImageDescriptor {
            image_id: ImageId::Bl33.into(),
            attr: EP_ST_ENABLE,
            pc: 0xc010_0000,
            spsr: Spsr::from_bits_retain(0x1da),
            lr_svc: 0xc000_0040,
            args: [7; 4],
        };
        let mut handoff = BootHandoff::new(Some(&bl33));
        let ep = EntryPointInfo::non_secure(handoff.target());
        assert_eq!(ep.header.kind, PARAM_EP);
        assert_eq!(ep.header.attr, EP_NON_SECURE | EP_ST_ENABLE);
        assert_eq!(usize::from(ep.header.size), size_of::<EntryPointInfo>());
        assert_eq!(ep.pc, 0xc010_0000);
        assert_eq!(ep.spsr, 0x1da);
        assert_eq!(ep.lr_svc, 0xc000_0040);
        assert_eq!(ep.args, [7; 4]);

        // A zeroed handoff still describes a non-secure image.
        handoff = BootHandoff::default();
        assert_eq!(
            EntryPointInfo::non_secure(handoff.target()).header.attr,
            EP_NON_SECURE
        );
    }

    #[test]
    fn walk_list() {
        let bl33_ep = entry_point(0xc010_0000);
        let bl32_ep = entry_point(0x2ffc_0000);
        let bl33 = BlParamsNode {
            image_id: ImageId::Bl33.into(),
            image_info: null(),
            ep_info: &bl33_ep,
            next: null(),
        };
        let no_entry = BlParamsNode {
            image_id: 9,
            image_info: null(),
            ep_info: null(),
            next: &bl33,
        };
        let bl32 = BlParamsNode {
            image_id: ImageId::Bl32.into(),
            image_info: null(),
            ep_info: &bl32_ep,
            next: &no_entry,
        };
        let params = BlParams {
            head: &bl32,
            ..Default::default()
        };

        // SAFETY: The list is valid and outlives the iterator.
        let images: Vec<_> = unsafe { images(&params) }.unwrap().collect();
        assert_eq!(
            images,
            vec![
                ImageDescriptor {
                    image_id: 4,
                    attr: EP_NON_SECURE | EP_ST_ENABLE,
                    pc: 0x2ffc_0000,
                    spsr: Spsr::from_bits_retain(0x1da),
                    lr_svc: 0x2ffc_1000,
                    args: [1, 2, 3, 4],
                },
                ImageDescriptor {
                    image_id: 5,
                    attr: EP_NON_SECURE | EP_ST_ENABLE,
                    pc: 0xc010_0000,
                    spsr: Spsr::from_bits_retain(0x1da),
                    lr_svc: 0x2ffc_1000,
                    args: [1, 2, 3, 4],
                },
            ]
        );
    }

    #[test]
    fn empty_list() {
        let params = BlParams::default();
        // SAFETY: The list is valid and outlives the iterator.
        assert_eq!(unsafe { images(&params) }.unwrap().count(), 0);
        assert_eq!(Images::empty().count(), 0);
    }

    #[test]
    fn invalid_header() {
        // SAFETY: A null pointer is allowed.
        assert_eq!(
            unsafe { images(null_mut()) }.err(),
            Some(Error::CorruptedState(Corruption::InvalidHandoff))
        );

        let mut params = BlParams::default();
        params.header.version = 1;
        // SAFETY: The list is valid and outlives the iterator.
        assert!(unsafe { images(&params) }.is_err());

        let mut params = BlParams::default();
        params.header.kind = PARAM_EP;
        // SAFETY: The list is valid and outlives the iterator.
        assert!(unsafe { images(&params) }.is_err());
    }
}

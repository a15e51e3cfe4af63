/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Supported sensor models.

pub mod s5k2l3;
pub mod s5k2l4;
pub mod s5k3m5;

pub use s5k2l3::S5k2l3;
pub use s5k2l4::S5k2l4;
pub use s5k3m5::S5k3m5;

use crate::program::{w16, w8, RegisterOp, RegisterProgram};

/// Selects the register page for indirect access
pub(crate) const PAGE_SELECT: u16 = 0x6028;
/// Indirect access address within the selected page
pub(crate) const INDIRECT_ADDR: u16 = 0x602A;
/// Auto-incrementing indirect data port
pub(crate) const INDIRECT_DATA: u16 = 0x6F12;
/// Host interface page for direct access to the 0x4000 block
pub(crate) const HOST_PAGE: u16 = 0xFCFC;

pub(crate) const STREAM_OFF_OPS: &[RegisterOp] = &[w8(0x0100, 0x00)];

pub(crate) const HOST_PAGE_OPS: &[RegisterOp] = &[w16(HOST_PAGE, 0x4000)];

pub(crate) const SRAM_PAGE_OPS: &[RegisterOp] = &[w16(PAGE_SELECT, 0x2000)];

pub(crate) const HOST_PAGE_PROGRAM: RegisterProgram =
    RegisterProgram::new("host_page", HOST_PAGE_OPS);

//! Device configuration

use crate::protocol::{Rect, TextureFormat};
use crate::transfer::PAGE_SIZE;
use crate::{Error, Result};

/// Configuration for a [`crate::Virgl3dDevice`]
#[derive(Debug, Clone)]
pub struct Virgl3dConfig {
    /// Display width in pixels
    pub width: u32,
    /// Display height in pixels
    pub height: u32,
    /// Scanout presenting the drawtarget
    pub scanout_id: u32,
    /// Transfer region size in pages
    pub transfer_pages: usize,
    /// Debug name of the rendering context
    pub context_name: &'static str,
    /// Format of the drawtarget and scanout surfaces
    pub format: TextureFormat,
}

impl Virgl3dConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Set scanout index
    pub fn scanout(mut self, scanout_id: u32) -> Self {
        self.scanout_id = scanout_id;
        self
    }

    /// Set transfer region size
    pub fn transfer_pages(mut self, pages: usize) -> Self {
        self.transfer_pages = pages;
        self
    }

    /// Set context debug name
    pub fn context_name(mut self, name: &'static str) -> Self {
        self.context_name = name;
        self
    }

    /// Set surface format
    pub fn format(mut self, format: TextureFormat) -> Self {
        self.format = format;
        self
    }

    /// Transfer region size in bytes
    pub fn transfer_capacity(&self) -> usize {
        self.transfer_pages * PAGE_SIZE
    }

    /// Full display rectangle
    pub fn display_rect(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// Check the configuration can be used to build a device.
    ///
    /// The display extent is packed into 16-bit fields by
    /// SET_FRAMEBUFFER_STATE_NO_ATTACH.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidConfig);
        }
        if self.width > u16::MAX as u32 || self.height > u16::MAX as u32 {
            return Err(Error::InvalidConfig);
        }
        if self.transfer_pages == 0 || self.transfer_pages.checked_mul(PAGE_SIZE).is_none() {
            return Err(Error::InvalidConfig);
        }
        if self.context_name.is_empty() {
            return Err(Error::InvalidConfig);
        }
        Ok(())
    }
}

impl Default for Virgl3dConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            scanout_id: 0,
            transfer_pages: 32,
            context_name: "virgl3d",
            format: TextureFormat::B8G8R8X8Unorm,
        }
    }
}

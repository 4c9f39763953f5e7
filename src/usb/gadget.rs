//! configfs-based USB HID gadget lifecycle. Builds the gadget directory
//! tree under the configfs mount, binds it to a UDC to enumerate on the
//! host, and tears everything down again in reverse order.
//!
//! Layout reference: Documentation/usb/gadget_configfs.rst in the
//! kernel tree.
use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use thiserror::Error;

const STRINGS_LANG: &str = "0x409";
const UDC_CLASS_DIR: &str = "/sys/class/udc";

#[derive(Debug, Error)]
pub enum GadgetError {
    #[error("failed to create {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("failed to write gadget attribute {path}: {source}")]
    WriteAttribute { path: PathBuf, source: io::Error },
    #[error("failed to link function into gadget config: {0}")]
    LinkFunction(io::Error),
    #[error("no device controller found under {UDC_CLASS_DIR}")]
    NoUdcAvailable,
    #[error("failed to remove {path}: {source}")]
    Remove { path: PathBuf, source: io::Error },
}

/// Attribute values for one HID gadget, written verbatim into configfs.
#[derive(Debug, Clone)]
pub struct UsbGadgetHidParams {
    /// configfs mount point, normally /sys/kernel/config.
    pub configs_home: PathBuf,
    pub gadget_name: String,
    pub id_vendor: String,
    pub id_product: String,
    pub bcd_device: String,
    pub bcd_usb: String,
    pub b_max_packet_size0: String,
    pub b_device_protocol: String,
    pub b_device_subclass: String,
    pub b_device_class: String,
    pub serial: String,
    pub product: String,
    pub manufacturer: String,
    pub config_name: String,
    pub config_number: String,
    pub config_string: String,
    pub bm_attributes: String,
    pub max_power: String,
    pub function_instance: String,
    pub protocol: String,
    pub subclass: String,
    pub report_length: String,
    pub report_desc: Vec<u8>,
    /// UDC name to bind. Empty picks the first controller in sysfs.
    pub udc: String,
}

/// One configured HID gadget in configfs.
#[derive(Debug, Clone)]
pub struct UsbGadgetHid {
    params: UsbGadgetHidParams,
}

impl UsbGadgetHid {
    pub fn new(params: UsbGadgetHidParams) -> Self {
        Self { params }
    }

    fn gadget_dir(&self) -> PathBuf {
        self.params
            .configs_home
            .join("usb_gadget")
            .join(&self.params.gadget_name)
    }

    fn config_dir(&self) -> PathBuf {
        self.gadget_dir().join("configs").join(format!(
            "{}.{}",
            self.params.config_name, self.params.config_number
        ))
    }

    fn function_dir(&self) -> PathBuf {
        self.gadget_dir()
            .join("functions")
            .join(format!("hid.{}", self.params.function_instance))
    }

    /// The attribute files this gadget writes, relative to its
    /// directories having been created.
    fn attributes(&self) -> Vec<(PathBuf, Vec<u8>)> {
        let p = &self.params;
        let gadget = self.gadget_dir();
        let config = self.config_dir();
        let function = self.function_dir();
        vec![
            (gadget.join("idVendor"), p.id_vendor.clone().into_bytes()),
            (gadget.join("idProduct"), p.id_product.clone().into_bytes()),
            (gadget.join("bcdDevice"), p.bcd_device.clone().into_bytes()),
            (gadget.join("bcdUSB"), p.bcd_usb.clone().into_bytes()),
            (
                gadget.join("bMaxPacketSize0"),
                p.b_max_packet_size0.clone().into_bytes(),
            ),
            (
                gadget.join("bDeviceProtocol"),
                p.b_device_protocol.clone().into_bytes(),
            ),
            (
                gadget.join("bDeviceSubClass"),
                p.b_device_subclass.clone().into_bytes(),
            ),
            (
                gadget.join("bDeviceClass"),
                p.b_device_class.clone().into_bytes(),
            ),
            (
                gadget.join("strings").join(STRINGS_LANG).join("serialnumber"),
                p.serial.clone().into_bytes(),
            ),
            (
                gadget.join("strings").join(STRINGS_LANG).join("product"),
                p.product.clone().into_bytes(),
            ),
            (
                gadget.join("strings").join(STRINGS_LANG).join("manufacturer"),
                p.manufacturer.clone().into_bytes(),
            ),
            (
                config.join("strings").join(STRINGS_LANG).join("configuration"),
                p.config_string.clone().into_bytes(),
            ),
            (config.join("MaxPower"), p.max_power.clone().into_bytes()),
            (
                config.join("bmAttributes"),
                p.bm_attributes.clone().into_bytes(),
            ),
            (function.join("protocol"), p.protocol.clone().into_bytes()),
            (function.join("subclass"), p.subclass.clone().into_bytes()),
            (
                function.join("report_length"),
                p.report_length.clone().into_bytes(),
            ),
            (function.join("report_desc"), p.report_desc.clone()),
        ]
    }

    /// Create the gadget tree and populate every attribute. The gadget
    /// is not visible to the host until [UsbGadgetHid::enable] binds it
    /// to a device controller.
    pub fn setup(&self) -> Result<(), GadgetError> {
        let dirs = [
            self.gadget_dir(),
            self.gadget_dir().join("strings").join(STRINGS_LANG),
            self.config_dir(),
            self.config_dir().join("strings").join(STRINGS_LANG),
            self.function_dir(),
        ];
        for dir in dirs {
            log::debug!("creating gadget directory {}", dir.display());
            fs::create_dir_all(&dir).map_err(|source| GadgetError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        for (path, value) in self.attributes() {
            fs::write(&path, value).map_err(|source| GadgetError::WriteAttribute {
                path: path.clone(),
                source,
            })?;
        }
        let link = self
            .config_dir()
            .join(format!("hid.{}", self.params.function_instance));
        if !link.exists() {
            symlink(self.function_dir(), &link).map_err(GadgetError::LinkFunction)?;
        }
        Ok(())
    }

    /// Bind the gadget to a UDC, making it enumerate on the host.
    pub fn enable(&self) -> Result<(), GadgetError> {
        let udc = if self.params.udc.is_empty() {
            first_udc()?
        } else {
            self.params.udc.clone()
        };
        log::info!("binding gadget {} to UDC {udc}", self.params.gadget_name);
        let path = self.gadget_dir().join("UDC");
        fs::write(&path, udc).map_err(|source| GadgetError::WriteAttribute { path, source })
    }

    /// Unbind the gadget from its UDC. The gadget tree stays in place.
    pub fn disable(&self) -> Result<(), GadgetError> {
        let path = self.gadget_dir().join("UDC");
        fs::write(&path, "\n").map_err(|source| GadgetError::WriteAttribute { path, source })
    }

    /// Remove the gadget tree. Paths that are already gone are fine;
    /// cleanup runs before setup to clear stale state from a previous
    /// run.
    pub fn cleanup(&self) -> Result<(), GadgetError> {
        let link = self
            .config_dir()
            .join(format!("hid.{}", self.params.function_instance));
        remove_ignoring_missing(&link, false)?;
        remove_ignoring_missing(&self.config_dir().join("strings").join(STRINGS_LANG), true)?;
        remove_ignoring_missing(&self.config_dir(), true)?;
        remove_ignoring_missing(&self.function_dir(), true)?;
        remove_ignoring_missing(&self.gadget_dir().join("strings").join(STRINGS_LANG), true)?;
        remove_ignoring_missing(&self.gadget_dir(), true)?;
        Ok(())
    }
}

fn remove_ignoring_missing(path: &Path, is_dir: bool) -> Result<(), GadgetError> {
    let result = if is_dir {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(GadgetError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Pick the first device controller advertised in sysfs.
fn first_udc() -> Result<String, GadgetError> {
    let entries = fs::read_dir(UDC_CLASS_DIR).map_err(|_| GadgetError::NoUdcAvailable)?;
    for entry in entries.flatten() {
        if let Some(name) = entry.file_name().to_str() {
            return Ok(name.to_string());
        }
    }
    Err(GadgetError::NoUdcAvailable)
}

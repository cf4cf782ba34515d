//! Measurement Computing USB DAQ adapter backed by `libuldaq`.
//!
//! The vendor library is loaded at runtime, so the binary still starts (and
//! falls back to the simulated source) on machines without the driver.
use std::ffi::CStr;
use std::os::raw::{c_char, c_double, c_int, c_longlong, c_uint};
use libloading::Library;
use once_cell::sync::OnceCell;
use crate::drivers::source::SampleSource;
use crate::drivers::DaqError;
use crate::types::PinId;
type UlError = c_int;
type DaqDeviceHandle = c_longlong;
const ERR_NO_ERROR: UlError = 0;
const ERR_MSG_LEN: usize = 512;
const USB_IFC: c_int = 1;
const AI_SINGLE_ENDED: c_int = 2;
const BIP10VOLTS: c_int = 5;
const AIN_FF_DEFAULT: c_int = 0;
const AI_INFO_NUM_CHANS: c_int = 1;
const MAX_INVENTORY: usize = 16;
#[repr(C)]
#[derive(Clone, Copy)]
struct DaqDeviceDescriptor {
    product_name: [c_char; 64],
    product_id: c_uint,
    dev_interface: c_int,
    dev_string: [c_char; 64],
    unique_id: [c_char; 64],
    reserved: [c_char; 512],
}
impl DaqDeviceDescriptor {
    fn zeroed() -> Self {
        Self {
            product_name: [0; 64],
            product_id: 0,
            dev_interface: 0,
            dev_string: [0; 64],
            unique_id: [0; 64],
            reserved: [0; 512],
        }
    }
    fn product_name(&self) -> String {
        // Safety: the array is zero-initialised and libuldaq NUL-terminates it.
        unsafe { CStr::from_ptr(self.product_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}
struct UldaqApi {
    #[allow(dead_code)]
    lib: Library,
    get_inventory: unsafe extern "C" fn(c_int, *mut DaqDeviceDescriptor, *mut c_uint) -> UlError,
    create_device: unsafe extern "C" fn(DaqDeviceDescriptor) -> DaqDeviceHandle,
    connect: unsafe extern "C" fn(DaqDeviceHandle) -> UlError,
    disconnect: unsafe extern "C" fn(DaqDeviceHandle) -> UlError,
    release: unsafe extern "C" fn(DaqDeviceHandle) -> UlError,
    ai_get_info: unsafe extern "C" fn(DaqDeviceHandle, c_int, c_uint, *mut c_longlong) -> UlError,
    a_in: unsafe extern "C" fn(DaqDeviceHandle, c_int, c_int, c_int, c_int, *mut c_double) -> UlError,
    get_err_msg: unsafe extern "C" fn(UlError, *mut c_char) -> UlError,
}
impl UldaqApi {
    fn load() -> Result<Self, DaqError> {
        let name = libloading::library_filename("uldaq");
        let lib = unsafe { Library::new(&name) }.map_err(|e| {
            DaqError::DeviceUnavailable(format!("{} not loadable: {e}", name.to_string_lossy()))
        })?;
        let missing = |e: libloading::Error| DaqError::DeviceUnavailable(format!("libuldaq symbol: {e}"));
        // Safety: signatures follow uldaq.h from the vendor package.
        unsafe {
            Ok(Self {
                get_inventory: *lib.get(b"ulGetDaqDeviceInventory\0").map_err(missing)?,
                create_device: *lib.get(b"ulCreateDaqDevice\0").map_err(missing)?,
                connect: *lib.get(b"ulConnectDaqDevice\0").map_err(missing)?,
                disconnect: *lib.get(b"ulDisconnectDaqDevice\0").map_err(missing)?,
                release: *lib.get(b"ulReleaseDaqDevice\0").map_err(missing)?,
                ai_get_info: *lib.get(b"ulAIGetInfo\0").map_err(missing)?,
                a_in: *lib.get(b"ulAIn\0").map_err(missing)?,
                get_err_msg: *lib.get(b"ulGetErrMsg\0").map_err(missing)?,
                lib,
            })
        }
    }
    fn instance() -> Result<&'static UldaqApi, DaqError> {
        static API: OnceCell<UldaqApi> = OnceCell::new();
        API.get_or_try_init(Self::load)
    }
    fn message(&self, code: UlError) -> String {
        let mut buf = [0 as c_char; ERR_MSG_LEN];
        let rc = unsafe { (self.get_err_msg)(code, buf.as_mut_ptr()) };
        if rc != ERR_NO_ERROR {
            return format!("uldaq error {code}");
        }
        unsafe { CStr::from_ptr(buf.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
    fn check(&self, code: UlError, ctx: &str) -> Result<(), String> {
        if code == ERR_NO_ERROR {
            Ok(())
        } else {
            Err(format!("{ctx} failed: {} (code {code})", self.message(code)))
        }
    }
    fn inventory(&self) -> Result<Vec<DaqDeviceDescriptor>, String> {
        let mut descriptors = [DaqDeviceDescriptor::zeroed(); MAX_INVENTORY];
        let mut count = MAX_INVENTORY as c_uint;
        self.check(
            unsafe { (self.get_inventory)(USB_IFC, descriptors.as_mut_ptr(), &mut count as *mut c_uint) },
            "ulGetDaqDeviceInventory",
        )?;
        let count = (count as usize).min(MAX_INVENTORY);
        Ok(descriptors[..count].to_vec())
    }
}
/// Connected MCC device. Pin `n` maps to analog channel `n - 1`, read
/// single-ended on the ±10 V range.
pub struct UldaqSource {
    api: &'static UldaqApi,
    handle: DaqDeviceHandle,
    product: String,
    num_channels: u32,
    connected: bool,
}
impl UldaqSource {
    /// True when the driver loads and at least one USB device is attached.
    pub fn probe() -> bool {
        UldaqApi::instance()
            .ok()
            .and_then(|api| api.inventory().ok())
            .map_or(false, |devices| !devices.is_empty())
    }
    /// Connects to the first device in the USB inventory.
    pub fn connect_first() -> Result<Self, DaqError> {
        let api = UldaqApi::instance()?;
        let descriptor = api
            .inventory()
            .map_err(DaqError::DeviceUnavailable)?
            .into_iter()
            .next()
            .ok_or_else(|| DaqError::DeviceUnavailable("no MCC DAQ device found".into()))?;
        let handle = unsafe { (api.create_device)(descriptor) };
        if handle == 0 {
            return Err(DaqError::DeviceUnavailable("ulCreateDaqDevice returned no handle".into()));
        }
        let mut source = Self {
            api,
            handle,
            product: descriptor.product_name(),
            num_channels: 0,
            connected: false,
        };
        source.open()?;
        log::info!(
            "connected to MCC {} ({} analog inputs)",
            source.product,
            source.num_channels
        );
        Ok(source)
    }
    pub fn product(&self) -> &str {
        &self.product
    }
}
impl SampleSource for UldaqSource {
    fn next(&mut self, pin: PinId, _elapsed_seconds: f64) -> Result<f64, DaqError> {
        if !self.connected {
            return Err(DaqError::fault(pin, "device not connected"));
        }
        let channel = pin
            .checked_sub(1)
            .filter(|ch| *ch < self.num_channels)
            .ok_or_else(|| {
                DaqError::fault(pin, format!("no analog channel for pin (device has {})", self.num_channels))
            })?;
        let mut voltage: c_double = 0.0;
        let code = unsafe {
            (self.api.a_in)(
                self.handle,
                channel as c_int,
                AI_SINGLE_ENDED,
                BIP10VOLTS,
                AIN_FF_DEFAULT,
                &mut voltage as *mut c_double,
            )
        };
        self.api
            .check(code, "ulAIn")
            .map_err(|reason| DaqError::fault(pin, reason))?;
        Ok(voltage)
    }
    fn is_available(&self) -> bool {
        self.connected
    }
    fn open(&mut self) -> Result<(), DaqError> {
        if self.connected {
            return Ok(());
        }
        self.api
            .check(unsafe { (self.api.connect)(self.handle) }, "ulConnectDaqDevice")
            .map_err(DaqError::DeviceUnavailable)?;
        let mut chans: c_longlong = 0;
        self.api
            .check(
                unsafe { (self.api.ai_get_info)(self.handle, AI_INFO_NUM_CHANS, 0, &mut chans as *mut c_longlong) },
                "ulAIGetInfo",
            )
            .map_err(DaqError::DeviceUnavailable)?;
        self.num_channels = chans.max(0) as u32;
        self.connected = true;
        Ok(())
    }
    fn close(&mut self) {
        if self.connected {
            let code = unsafe { (self.api.disconnect)(self.handle) };
            if let Err(e) = self.api.check(code, "ulDisconnectDaqDevice") {
                log::warn!("{e}");
            }
            self.connected = false;
        }
    }
    fn describe(&self) -> String {
        format!("MCC {} ({} channels)", self.product, self.num_channels)
    }
}
impl Drop for UldaqSource {
    fn drop(&mut self) {
        self.close();
        let _ = unsafe { (self.api.release)(self.handle) };
    }
}

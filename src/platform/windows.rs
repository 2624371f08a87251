//! Windows platform sources.
//!
//! Process and module enumeration over Toolhelp snapshots, window
//! attributes over EnumWindows + extended styles, input/foreground state
//! over GetLastInputInfo, clipboard reads guarded by the sequence number,
//! and DirectShow / SetupAPI enumeration for cameras and peripherals.

use crate::platform::types::{
    ClipboardCapture, DeviceKind, DisplayRecord, ForegroundInfo, InputDeviceRecord,
    NetworkInterfaceRecord, ProcessRecord, ScreenBounds, WindowRecord,
};
use crate::platform::{
    ClipboardSource, InputStateSource, InventorySource, ProcessSource, ScreenSource,
};
use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, HANDLE, HWND, LPARAM, RECT, TRUE};
use windows::Win32::Graphics::Gdi::{
    EnumDisplayMonitors, GetMonitorInfoW, HDC, HMONITOR, MONITORINFO, MONITORINFOF_PRIMARY,
};
use windows::Win32::System::DataExchange::{
    CloseClipboard, GetClipboardData, GetClipboardOwner, GetClipboardSequenceNumber, OpenClipboard,
};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Module32FirstW, Module32NextW, Process32FirstW, Process32NextW,
    MODULEENTRY32W, PROCESSENTRY32W, TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32, TH32CS_SNAPPROCESS,
};
use windows::Win32::System::Memory::{GlobalLock, GlobalUnlock};
use windows::Win32::System::SystemInformation::GetTickCount;
use windows::Win32::UI::Input::KeyboardAndMouse::{GetLastInputInfo, LASTINPUTINFO};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetForegroundWindow, GetLayeredWindowAttributes, GetWindowLongW, GetWindowRect,
    GetWindowTextW, GetWindowThreadProcessId, IsIconic, IsWindowVisible, GWL_EXSTYLE,
    LAYERED_WINDOW_ATTRIBUTES_FLAGS, LWA_ALPHA, LWA_COLORKEY, WS_EX_LAYERED, WS_EX_NOACTIVATE,
    WS_EX_TOOLWINDOW, WS_EX_TOPMOST, WS_EX_TRANSPARENT,
};

const CF_UNICODETEXT: u32 = 13;

fn wide_to_string(buffer: &[u16]) -> String {
    let end = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
    String::from_utf16_lossy(&buffer[..end])
}

/// One pass over the Toolhelp process snapshot.
fn snapshot_processes(with_modules: bool) -> Vec<ProcessRecord> {
    let mut records = Vec::new();
    let snapshot = match unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) } {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(error = %e, "process snapshot failed");
            return records;
        }
    };

    let mut entry = PROCESSENTRY32W {
        dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
        ..Default::default()
    };
    if unsafe { Process32FirstW(snapshot, &mut entry) }.is_ok() {
        loop {
            let name = wide_to_string(&entry.szExeFile);
            let mut record = ProcessRecord::new(entry.th32ProcessID, name, "");
            if with_modules {
                record.loaded_modules = loaded_modules(entry.th32ProcessID, &mut record.path);
            }
            records.push(record);
            if unsafe { Process32NextW(snapshot, &mut entry) }.is_err() {
                break;
            }
        }
    }
    unsafe {
        let _ = CloseHandle(snapshot);
    }
    records
}

/// Module names for one process. The first module is the executable; its
/// path fills the record's path field. Access-denied (system processes) is
/// normal and yields an empty list.
fn loaded_modules(pid: u32, exe_path: &mut String) -> Vec<String> {
    let mut modules = Vec::new();
    let snapshot = match unsafe {
        CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid)
    } {
        Ok(handle) => handle,
        Err(_) => return modules,
    };

    let mut entry = MODULEENTRY32W {
        dwSize: std::mem::size_of::<MODULEENTRY32W>() as u32,
        ..Default::default()
    };
    if unsafe { Module32FirstW(snapshot, &mut entry) }.is_ok() {
        *exe_path = wide_to_string(&entry.szExePath);
        loop {
            modules.push(wide_to_string(&entry.szModule));
            if unsafe { Module32NextW(snapshot, &mut entry) }.is_err() {
                break;
            }
        }
    }
    unsafe {
        let _ = CloseHandle(snapshot);
    }
    modules
}

fn process_name(pid: u32) -> String {
    snapshot_processes(false)
        .into_iter()
        .find(|p| p.pid == pid)
        .map(|p| p.name)
        .unwrap_or_default()
}

pub struct WindowsProcessSource;

impl WindowsProcessSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WindowsProcessSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSource for WindowsProcessSource {
    fn processes(&mut self) -> Vec<ProcessRecord> {
        snapshot_processes(true)
    }
}

struct WindowEnumState {
    windows: Vec<WindowRecord>,
    names: std::collections::HashMap<u32, String>,
}

extern "system" fn enum_windows_proc(hwnd: HWND, lparam: LPARAM) -> windows::Win32::Foundation::BOOL {
    let state = unsafe { &mut *(lparam.0 as *mut WindowEnumState) };

    if !unsafe { IsWindowVisible(hwnd) }.as_bool() {
        return TRUE;
    }

    let mut rect = RECT::default();
    if unsafe { GetWindowRect(hwnd, &mut rect) }.is_err() {
        return TRUE;
    }

    let mut pid = 0u32;
    unsafe { GetWindowThreadProcessId(hwnd, Some(&mut pid)) };

    let ex_style = unsafe { GetWindowLongW(hwnd, GWL_EXSTYLE) } as u32;
    let layered = ex_style & WS_EX_LAYERED.0 != 0;

    let mut alpha = None;
    let mut color_key = false;
    if layered {
        let mut key = windows::Win32::Foundation::COLORREF(0);
        let mut alpha_byte = 0u8;
        let mut flags = LAYERED_WINDOW_ATTRIBUTES_FLAGS(0);
        if unsafe {
            GetLayeredWindowAttributes(
                hwnd,
                Some(&mut key),
                Some(&mut alpha_byte),
                Some(&mut flags),
            )
        }
        .is_ok()
        {
            if flags.0 & LWA_ALPHA.0 != 0 {
                alpha = Some(alpha_byte);
            }
            color_key = flags.0 & LWA_COLORKEY.0 != 0;
        }
    }

    let process_name = state.names.get(&pid).cloned().unwrap_or_default();

    // Enumeration runs front to back, so the index is the z-order.
    state.windows.push(WindowRecord {
        handle: format!("{:#x}", hwnd.0 as usize),
        pid,
        process_name,
        x: rect.left,
        y: rect.top,
        width: rect.right - rect.left,
        height: rect.bottom - rect.top,
        z_order: state.windows.len() as i32,
        layered,
        topmost: ex_style & WS_EX_TOPMOST.0 != 0,
        tool_window: ex_style & WS_EX_TOOLWINDOW.0 != 0,
        click_through: ex_style & WS_EX_TRANSPARENT.0 != 0,
        no_activate: ex_style & WS_EX_NOACTIVATE.0 != 0,
        color_key,
        alpha,
    });
    TRUE
}

extern "system" fn enum_monitors_proc(
    monitor: HMONITOR,
    _hdc: HDC,
    _rect: *mut RECT,
    lparam: LPARAM,
) -> windows::Win32::Foundation::BOOL {
    let monitors = unsafe { &mut *(lparam.0 as *mut Vec<(ScreenBounds, bool)>) };
    let mut info = MONITORINFO {
        cbSize: std::mem::size_of::<MONITORINFO>() as u32,
        ..Default::default()
    };
    if unsafe { GetMonitorInfoW(monitor, &mut info) }.as_bool() {
        monitors.push((
            ScreenBounds {
                x: info.rcMonitor.left,
                y: info.rcMonitor.top,
                width: info.rcMonitor.right - info.rcMonitor.left,
                height: info.rcMonitor.bottom - info.rcMonitor.top,
            },
            info.dwFlags & MONITORINFOF_PRIMARY != 0,
        ));
    }
    TRUE
}

fn enumerate_monitors() -> Vec<(ScreenBounds, bool)> {
    let mut monitors: Vec<(ScreenBounds, bool)> = Vec::new();
    unsafe {
        let _ = EnumDisplayMonitors(
            HDC::default(),
            None,
            Some(enum_monitors_proc),
            LPARAM(&mut monitors as *mut _ as isize),
        );
    }
    monitors
}

const VIRTUAL_CAMERA_MARKERS: &[&str] = &[
    "virtual", "obs", "manycam", "snap camera", "xsplit", "droidcam", "epoccam",
];

/// Friendly names of DirectShow video-input devices that look virtual.
fn directshow_virtual_cameras() -> Vec<String> {
    use windows::Win32::Media::DirectShow::{ICreateDevEnum, CLSID_SystemDeviceEnum};
    use windows::Win32::System::Com::StructuredStorage::IPropertyBag;
    use windows::Win32::System::Com::{
        CoCreateInstance, CoInitializeEx, CoUninitialize, CLSCTX_INPROC_SERVER,
        COINIT_APARTMENTTHREADED,
    };

    // {860BB310-5D01-11d0-BD3B-00A0C911CE86}: video input device category.
    const CLSID_VIDEO_INPUT_CATEGORY: windows::core::GUID =
        windows::core::GUID::from_u128(0x860bb310_5d01_11d0_bd3b_00a0c911ce86);

    let mut cameras = Vec::new();
    let com = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) };
    if com.is_err() {
        return cameras;
    }

    let result: windows::core::Result<()> = (|| unsafe {
        let dev_enum: ICreateDevEnum =
            CoCreateInstance(&CLSID_SystemDeviceEnum, None, CLSCTX_INPROC_SERVER)?;
        let mut enum_moniker = None;
        dev_enum.CreateClassEnumerator(&CLSID_VIDEO_INPUT_CATEGORY, &mut enum_moniker, 0)?;
        let Some(enum_moniker) = enum_moniker else {
            return Ok(());
        };

        let mut monikers = [None; 1];
        while enum_moniker.Next(&mut monikers, None).is_ok() {
            let Some(moniker) = monikers[0].take() else {
                break;
            };
            let bag: IPropertyBag = moniker.BindToStorage(None, None)?;
            let mut value = windows::core::VARIANT::default();
            if bag
                .Read(windows::core::w!("FriendlyName"), &mut value, None)
                .is_ok()
            {
                let name = value.to_string();
                let lower = name.to_lowercase();
                if VIRTUAL_CAMERA_MARKERS.iter().any(|m| lower.contains(m)) {
                    cameras.push(name);
                }
            }
        }
        Ok(())
    })();

    if let Err(e) = result {
        tracing::debug!(error = %e, "DirectShow camera enumeration failed");
    }
    unsafe { CoUninitialize() };
    cameras
}

/// Probe whether another consumer holds desktop duplication on the primary
/// output. Acquiring and immediately releasing the duplication answers it:
/// the API refuses a second concurrent consumer.
fn duplication_in_use() -> bool {
    use windows::core::Interface;
    use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_HARDWARE;
    use windows::Win32::Graphics::Direct3D11::{
        D3D11CreateDevice, D3D11_CREATE_DEVICE_FLAG, D3D11_SDK_VERSION,
    };
    use windows::Win32::Graphics::Dxgi::{IDXGIDevice, IDXGIOutput1, DXGI_ERROR_NOT_CURRENTLY_AVAILABLE};

    let attempt = || -> windows::core::Result<bool> {
        let mut device = None;
        unsafe {
            D3D11CreateDevice(
                None,
                D3D_DRIVER_TYPE_HARDWARE,
                None,
                D3D11_CREATE_DEVICE_FLAG(0),
                None,
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                None,
            )?;
        }
        let device = device.ok_or_else(windows::core::Error::empty)?;
        let dxgi: IDXGIDevice = device.cast()?;
        let adapter = unsafe { dxgi.GetAdapter() }?;
        let output = unsafe { adapter.EnumOutputs(0) }?;
        let output1: IDXGIOutput1 = output.cast()?;
        match unsafe { output1.DuplicateOutput(&device) } {
            // We could take it, so nobody else held it; release immediately.
            Ok(_duplication) => Ok(false),
            Err(e) if e.code() == DXGI_ERROR_NOT_CURRENTLY_AVAILABLE => Ok(true),
            Err(_) => Ok(false),
        }
    };
    attempt().unwrap_or(false)
}

pub struct WindowsScreenSource;

impl WindowsScreenSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WindowsScreenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenSource for WindowsScreenSource {
    fn overlay_candidates(&mut self) -> Vec<WindowRecord> {
        let names = snapshot_processes(false)
            .into_iter()
            .map(|p| (p.pid, p.name))
            .collect();
        let mut state = WindowEnumState {
            windows: Vec::new(),
            names,
        };
        unsafe {
            let _ = EnumWindows(
                Some(enum_windows_proc),
                LPARAM(&mut state as *mut _ as isize),
            );
        }
        state.windows
    }

    fn screens(&mut self) -> Vec<ScreenBounds> {
        enumerate_monitors()
            .into_iter()
            .map(|(bounds, _)| bounds)
            .collect()
    }

    fn displays(&mut self) -> Vec<DisplayRecord> {
        enumerate_monitors()
            .into_iter()
            .enumerate()
            .map(|(i, (bounds, primary))| DisplayRecord {
                name: format!("display-{i}"),
                width: bounds.width,
                height: bounds.height,
                is_primary: primary,
                is_external: !primary,
                is_mirrored: false,
            })
            .collect()
    }

    fn virtual_cameras(&mut self) -> Vec<String> {
        directshow_virtual_cameras()
    }

    fn duplication_active(&mut self) -> bool {
        duplication_in_use()
    }
}

pub struct WindowsInputStateSource;

impl WindowsInputStateSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WindowsInputStateSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InputStateSource for WindowsInputStateSource {
    fn idle_seconds(&mut self) -> Option<u64> {
        let mut info = LASTINPUTINFO {
            cbSize: std::mem::size_of::<LASTINPUTINFO>() as u32,
            dwTime: 0,
        };
        if !unsafe { GetLastInputInfo(&mut info) }.as_bool() {
            return None;
        }
        let now = unsafe { GetTickCount() };
        // Tick counters wrap at 49.7 days; wrapping_sub handles it.
        Some(now.wrapping_sub(info.dwTime) as u64 / 1000)
    }

    fn foreground(&mut self) -> Option<ForegroundInfo> {
        let hwnd = unsafe { GetForegroundWindow() };
        if hwnd.0.is_null() {
            return None;
        }
        let mut title = [0u16; 512];
        let len = unsafe { GetWindowTextW(hwnd, &mut title) } as usize;
        let mut pid = 0u32;
        unsafe { GetWindowThreadProcessId(hwnd, Some(&mut pid)) };

        Some(ForegroundInfo {
            app_name: process_name(pid),
            window_title: String::from_utf16_lossy(&title[..len]),
            window_handle: hwnd.0 as u64,
            is_minimized: unsafe { IsIconic(hwnd) }.as_bool(),
        })
    }
}

pub struct WindowsClipboardSource {
    last_sequence: u32,
}

impl WindowsClipboardSource {
    pub fn new() -> Self {
        Self {
            // Current sequence at startup; pre-existing content is not an event.
            last_sequence: unsafe { GetClipboardSequenceNumber() },
        }
    }

    /// Open the clipboard with retries. Another process holding it open is
    /// transient; back off 10·k ms.
    fn open_with_retry() -> bool {
        for attempt in 1..=3u64 {
            if unsafe { OpenClipboard(HWND::default()) }.is_ok() {
                return true;
            }
            std::thread::sleep(std::time::Duration::from_millis(10 * attempt));
        }
        false
    }

    fn read_text() -> Option<String> {
        let handle = unsafe { GetClipboardData(CF_UNICODETEXT) }.ok()?;
        if handle.is_invalid() {
            return None;
        }
        let global = windows::Win32::Foundation::HGLOBAL(handle.0);
        let ptr = unsafe { GlobalLock(global) } as *const u16;
        if ptr.is_null() {
            return None;
        }
        let mut len = 0usize;
        while unsafe { *ptr.add(len) } != 0 {
            len += 1;
        }
        let text = String::from_utf16_lossy(unsafe { std::slice::from_raw_parts(ptr, len) });
        unsafe {
            let _ = GlobalUnlock(global);
        }
        Some(text)
    }
}

impl Default for WindowsClipboardSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ClipboardSource for WindowsClipboardSource {
    fn poll(&mut self) -> Option<ClipboardCapture> {
        let sequence = unsafe { GetClipboardSequenceNumber() };
        if sequence == self.last_sequence {
            return None;
        }
        self.last_sequence = sequence;

        if !Self::open_with_retry() {
            tracing::debug!("clipboard busy, change skipped");
            return None;
        }
        let content = Self::read_text();
        let owner = unsafe { GetClipboardOwner() };
        unsafe {
            let _ = CloseClipboard();
        }

        let mut source_pid = 0u32;
        if let Ok(owner) = owner {
            unsafe { GetWindowThreadProcessId(owner, Some(&mut source_pid)) };
        }

        Some(ClipboardCapture {
            format: if content.is_some() {
                "text".to_string()
            } else {
                "other".to_string()
            },
            content,
            source_app: process_name(source_pid),
            source_pid,
            sequence: sequence as u64,
        })
    }
}

pub struct WindowsInventorySource {
    networks: sysinfo::Networks,
}

impl WindowsInventorySource {
    pub fn new() -> Self {
        Self {
            networks: sysinfo::Networks::new(),
        }
    }

    fn devices_of_class(class: &windows::core::GUID, kind: DeviceKind) -> Vec<InputDeviceRecord> {
        use windows::Win32::Devices::DeviceAndDriverInstallation::{
            SetupDiDestroyDeviceInfoList, SetupDiEnumDeviceInfo, SetupDiGetClassDevsW,
            SetupDiGetDeviceInstanceIdW, SetupDiGetDeviceRegistryPropertyW, DIGCF_PRESENT,
            SPDRP_DEVICEDESC, SPDRP_MFG, SP_DEVINFO_DATA,
        };

        let mut devices = Vec::new();
        let info_set = match unsafe {
            SetupDiGetClassDevsW(Some(class), PCWSTR::null(), HWND::default(), DIGCF_PRESENT)
        } {
            Ok(set) => set,
            Err(_) => return devices,
        };

        let mut index = 0u32;
        loop {
            let mut data = SP_DEVINFO_DATA {
                cbSize: std::mem::size_of::<SP_DEVINFO_DATA>() as u32,
                ..Default::default()
            };
            if unsafe { SetupDiEnumDeviceInfo(info_set, index, &mut data) }.is_err() {
                break;
            }
            index += 1;

            let mut id_buffer = [0u16; 512];
            let device_id = unsafe {
                SetupDiGetDeviceInstanceIdW(info_set, &data, Some(&mut id_buffer), None)
            }
            .map(|_| wide_to_string(&id_buffer))
            .unwrap_or_default();

            let read_prop = |prop| {
                let mut buffer = [0u8; 1024];
                unsafe {
                    SetupDiGetDeviceRegistryPropertyW(
                        info_set,
                        &data,
                        prop,
                        None,
                        Some(&mut buffer),
                        None,
                    )
                }
                .ok()
                .map(|_| {
                    let wide: Vec<u16> = buffer
                        .chunks_exact(2)
                        .map(|c| u16::from_le_bytes([c[0], c[1]]))
                        .collect();
                    wide_to_string(&wide)
                })
                .unwrap_or_default()
            };

            let name = read_prop(SPDRP_DEVICEDESC);
            let manufacturer = read_prop(SPDRP_MFG);

            // Instance ids carry VID_xxxx&PID_xxxx for USB devices.
            let extract = |marker: &str| {
                device_id
                    .to_uppercase()
                    .find(marker)
                    .and_then(|at| device_id.get(at + marker.len()..at + marker.len() + 4))
                    .unwrap_or_default()
                    .to_string()
            };

            let mut record = InputDeviceRecord::new(name, kind, device_id.clone());
            record.vendor_id = extract("VID_");
            record.product_id = extract("PID_");
            record.manufacturer = manufacturer;
            devices.push(record);
        }
        unsafe {
            let _ = SetupDiDestroyDeviceInfoList(info_set);
        }
        devices
    }
}

impl Default for WindowsInventorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl InventorySource for WindowsInventorySource {
    fn input_devices(&mut self) -> Vec<InputDeviceRecord> {
        // Setup class GUIDs: mouse, keyboard, camera, media (audio).
        const GUID_MOUSE: windows::core::GUID =
            windows::core::GUID::from_u128(0x4d36e96f_e325_11ce_bfc1_08002be10318);
        const GUID_KEYBOARD: windows::core::GUID =
            windows::core::GUID::from_u128(0x4d36e96b_e325_11ce_bfc1_08002be10318);
        const GUID_CAMERA: windows::core::GUID =
            windows::core::GUID::from_u128(0xca3e7ab9_b4c3_4ae6_8251_579ef933890f);
        const GUID_MEDIA: windows::core::GUID =
            windows::core::GUID::from_u128(0x4d36e96c_e325_11ce_bfc1_08002be10318);

        let mut devices = Self::devices_of_class(&GUID_MOUSE, DeviceKind::Mouse);
        devices.extend(Self::devices_of_class(&GUID_KEYBOARD, DeviceKind::Keyboard));
        devices.extend(Self::devices_of_class(&GUID_CAMERA, DeviceKind::Video));
        devices.extend(Self::devices_of_class(&GUID_MEDIA, DeviceKind::Audio));
        devices
    }

    fn network_interfaces(&mut self) -> Vec<NetworkInterfaceRecord> {
        self.networks.refresh_list();
        self.networks
            .iter()
            .map(|(name, data)| NetworkInterfaceRecord {
                name: name.clone(),
                ips: data
                    .ip_networks()
                    .iter()
                    .map(|ip| ip.addr.to_string())
                    .collect(),
            })
            .collect()
    }

    fn display_count(&mut self) -> usize {
        enumerate_monitors().len()
    }
}

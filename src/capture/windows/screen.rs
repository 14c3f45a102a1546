//! Windows display enumeration and frame capture using GDI
//!
//! Monitors are enumerated with `EnumDisplayMonitors`; frames are
//! captured with `BitBlt` into a top-down 32bpp DIB, which yields the
//! tightly packed BGRA layout the video sink expects.

use crate::capture::traits::DisplayInfo;
use std::mem::zeroed;
use windows::{
    Win32::Foundation::{BOOL, LPARAM, RECT},
    Win32::Graphics::Gdi::{
        BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject,
        EnumDisplayMonitors, GetDC, GetDIBits, GetMonitorInfoW, ReleaseDC, SelectObject,
        BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, HDC, HMONITOR, MONITORINFOEXW,
        SRCCOPY,
    },
    Win32::UI::WindowsAndMessaging::GetDesktopWindow,
};

/// Get the list of available displays.
pub fn get_displays() -> Vec<DisplayInfo> {
    let mut displays = Vec::new();
    let displays_ptr = &mut displays as *mut Vec<DisplayInfo>;

    unsafe extern "system" fn enum_monitors_callback(
        hmonitor: HMONITOR,
        _hdc: HDC,
        _rect: *mut RECT,
        lparam: LPARAM,
    ) -> BOOL {
        let displays = &mut *(lparam.0 as *mut Vec<DisplayInfo>);

        let mut monitor_info: MONITORINFOEXW = unsafe { zeroed() };
        monitor_info.monitorInfo.cbSize = std::mem::size_of::<MONITORINFOEXW>() as u32;

        if unsafe { GetMonitorInfoW(hmonitor, &mut monitor_info.monitorInfo) }.as_bool() {
            let rect = monitor_info.monitorInfo.rcMonitor;
            let width = (rect.right - rect.left) as u32;
            let height = (rect.bottom - rect.top) as u32;
            let is_primary = (monitor_info.monitorInfo.dwFlags & 1) != 0; // MONITORINFOF_PRIMARY

            let name_len = monitor_info
                .szDevice
                .iter()
                .position(|&c| c == 0)
                .unwrap_or(monitor_info.szDevice.len());
            let name = String::from_utf16_lossy(&monitor_info.szDevice[..name_len]);

            displays.push(DisplayInfo {
                id: displays.len() as u32,
                name: if is_primary {
                    "Primary Display".to_string()
                } else {
                    name
                },
                width,
                height,
                scale_factor: 1.0,
                is_primary,
                refresh_rate: Some(60),
            });
        }

        BOOL::from(true)
    }

    unsafe {
        let _ = EnumDisplayMonitors(
            HDC::default(),
            None,
            Some(enum_monitors_callback),
            LPARAM(displays_ptr as isize),
        );
    }

    displays
}

/// GDI captures at the monitor rect size, so logical and pixel
/// dimensions coincide.
pub fn display_pixel_size(display_id: u32) -> Option<(u32, u32)> {
    get_displays()
        .get(display_id as usize)
        .map(|d| (d.width, d.height))
}

/// Capture one frame of a display as tightly packed BGRA.
pub fn grab_frame(display_id: u32) -> Option<Vec<u8>> {
    let displays = get_displays();
    let display = displays.get(display_id as usize)?;
    let width = display.width as i32;
    let height = display.height as i32;

    unsafe {
        let hwnd = GetDesktopWindow();
        let hdc_screen = GetDC(hwnd);
        if hdc_screen.is_invalid() {
            return None;
        }

        let hdc_mem = CreateCompatibleDC(hdc_screen);
        if hdc_mem.is_invalid() {
            ReleaseDC(hwnd, hdc_screen);
            return None;
        }

        let hbitmap = CreateCompatibleBitmap(hdc_screen, width, height);
        let old = SelectObject(hdc_mem, hbitmap);

        let blt_ok = BitBlt(hdc_mem, 0, 0, width, height, hdc_screen, 0, 0, SRCCOPY).is_ok();

        let mut buffer = vec![0u8; (width * height * 4) as usize];
        let mut info: BITMAPINFO = zeroed();
        info.bmiHeader = BITMAPINFOHEADER {
            biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: width,
            // Negative height requests a top-down DIB
            biHeight: -height,
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB.0,
            ..zeroed()
        };

        let lines = GetDIBits(
            hdc_mem,
            hbitmap,
            0,
            height as u32,
            Some(buffer.as_mut_ptr() as *mut _),
            &mut info,
            DIB_RGB_COLORS,
        );

        SelectObject(hdc_mem, old);
        let _ = DeleteObject(hbitmap);
        let _ = DeleteDC(hdc_mem);
        ReleaseDC(hwnd, hdc_screen);

        if !blt_ok || lines == 0 {
            return None;
        }
        Some(buffer)
    }
}

//! libmpv handle: async commands, property writes and observed properties
//! delivered as push events.

use std::ffi::CString;
use std::os::raw::c_char;
use std::path::Path;

use libmpv2::Mpv;
use log::{debug, warn};

const OBS_TIME_POS: u64 = 1;
const OBS_DURATION: u64 = 2;
const OBS_PAUSE: u64 = 3;
const OBS_DWIDTH: u64 = 4;
const OBS_DHEIGHT: u64 = 5;

/// What mpv told us since the last poll.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MpvEvent {
    FileLoaded,
    EndFile,
    Shutdown,
    TimePos(f64),
    Duration(f64),
    Pause(bool),
    Width(i64),
    Height(i64),
}

pub struct MpvPlayer {
    mpv: Mpv,
}

impl MpvPlayer {
    pub fn new() -> Result<Self, String> {
        let mpv = Mpv::new().map_err(|e| format!("mpv init: {}", e))?;
        for (name, value) in [
            ("vo", "libmpv"),
            ("hwdec", "auto"),
            ("terminal", "no"),
            ("keep-open", "yes"),
        ] {
            mpv.set_property(name, value)
                .map_err(|e| format!("mpv {}: {}", name, e))?;
        }
        let player = MpvPlayer { mpv };
        player.observe(OBS_TIME_POS, "time-pos", libmpv2_sys::mpv_format_MPV_FORMAT_DOUBLE);
        player.observe(OBS_DURATION, "duration", libmpv2_sys::mpv_format_MPV_FORMAT_DOUBLE);
        player.observe(OBS_PAUSE, "pause", libmpv2_sys::mpv_format_MPV_FORMAT_FLAG);
        player.observe(OBS_DWIDTH, "dwidth", libmpv2_sys::mpv_format_MPV_FORMAT_INT64);
        player.observe(OBS_DHEIGHT, "dheight", libmpv2_sys::mpv_format_MPV_FORMAT_INT64);
        Ok(player)
    }

    pub fn handle(&self) -> *mut libmpv2_sys::mpv_handle {
        self.mpv.ctx.as_ptr()
    }

    fn observe(&self, id: u64, name: &str, format: libmpv2_sys::mpv_format) {
        let Ok(c) = CString::new(name) else {
            return;
        };
        unsafe {
            libmpv2_sys::mpv_observe_property(self.handle(), id, c.as_ptr(), format);
        }
    }

    /// Send a command without waiting for mpv to process it.
    fn command_async(&self, args: &[&str]) {
        let Ok(owned) = args
            .iter()
            .map(|a| CString::new(*a))
            .collect::<Result<Vec<_>, _>>()
        else {
            warn!("mpv: bad command argument in {:?}", args);
            return;
        };
        let mut ptrs: Vec<*const c_char> = owned.iter().map(|c| c.as_ptr()).collect();
        ptrs.push(std::ptr::null());
        unsafe {
            libmpv2_sys::mpv_command_async(self.handle(), 0, ptrs.as_mut_ptr());
        }
    }

    pub fn load(&self, path: &Path) {
        prefetch_file(path);
        self.command_async(&["loadfile", &path.to_string_lossy()]);
    }

    pub fn stop(&self) {
        self.command_async(&["stop"]);
    }

    pub fn seek(&self, time: f64) {
        self.command_async(&["seek", &format!("{:.3}", time), "absolute"]);
    }

    pub fn set_speed(&self, rate: f64) {
        if let Err(e) = self.mpv.set_property("speed", rate) {
            warn!("mpv: speed {}: {}", rate, e);
        }
    }

    /// `volume` is 0.0..=1.0; mpv wants percent.
    pub fn set_volume(&self, volume: f64) {
        if let Err(e) = self.mpv.set_property("volume", volume * 100.0) {
            warn!("mpv: volume {}: {}", volume, e);
        }
    }

    pub fn set_pause(&self, paused: bool) {
        if let Err(e) = self.mpv.set_property("pause", paused) {
            warn!("mpv: pause {}: {}", paused, e);
        }
    }

    /// Drain pending mpv events without blocking.
    pub fn poll(&self) -> Vec<MpvEvent> {
        let mut out = Vec::new();
        loop {
            let ev = unsafe { libmpv2_sys::mpv_wait_event(self.handle(), 0.0) };
            if ev.is_null() {
                break;
            }
            let event_id = unsafe { (*ev).event_id };
            match event_id {
                libmpv2_sys::mpv_event_id_MPV_EVENT_NONE => break,
                libmpv2_sys::mpv_event_id_MPV_EVENT_SHUTDOWN => {
                    out.push(MpvEvent::Shutdown);
                    break;
                }
                libmpv2_sys::mpv_event_id_MPV_EVENT_FILE_LOADED => out.push(MpvEvent::FileLoaded),
                libmpv2_sys::mpv_event_id_MPV_EVENT_END_FILE => out.push(MpvEvent::EndFile),
                libmpv2_sys::mpv_event_id_MPV_EVENT_PROPERTY_CHANGE => {
                    if let Some(e) = unsafe { property_event(ev) } {
                        out.push(e);
                    }
                }
                _ => {}
            }
        }
        out
    }

    /// Skip `mpv_destroy`, which can block for seconds on some platforms.
    /// Only for process exit.
    pub fn leak(self) {
        debug!("mpv: leaking handle at exit");
        std::mem::forget(self.mpv);
    }
}

unsafe fn property_event(ev: *const libmpv2_sys::mpv_event) -> Option<MpvEvent> {
    let prop = (*ev).data as *const libmpv2_sys::mpv_event_property;
    if prop.is_null() || (*prop).data.is_null() {
        return None;
    }
    let format = (*prop).format;
    let double = || {
        (format == libmpv2_sys::mpv_format_MPV_FORMAT_DOUBLE).then(|| *((*prop).data as *const f64))
    };
    let int = || {
        (format == libmpv2_sys::mpv_format_MPV_FORMAT_INT64).then(|| *((*prop).data as *const i64))
    };
    match (*ev).reply_userdata {
        OBS_TIME_POS => double().map(MpvEvent::TimePos),
        OBS_DURATION => double().map(MpvEvent::Duration),
        OBS_PAUSE => (format == libmpv2_sys::mpv_format_MPV_FORMAT_FLAG)
            .then(|| MpvEvent::Pause(*((*prop).data as *const i32) != 0)),
        OBS_DWIDTH => int().map(MpvEvent::Width),
        OBS_DHEIGHT => int().map(MpvEvent::Height),
        _ => None,
    }
}

/// Advise the OS to prefetch a file into the page cache (helps on network FS).
#[cfg(target_os = "linux")]
fn prefetch_file(path: &Path) {
    use std::os::unix::io::AsRawFd;
    if let Ok(f) = std::fs::File::open(path) {
        unsafe {
            libc::posix_fadvise(f.as_raw_fd(), 0, 0, libc::POSIX_FADV_WILLNEED);
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn prefetch_file(_path: &Path) {}

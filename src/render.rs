//! Off-thread mpv rendering.
//!
//! mpv draws into one of two FBO textures on a shared GL context owned by
//! the render thread. The main thread only blits the last published texture,
//! so a slow decode never stalls key handling.

use std::ffi::CString;
use std::os::raw::{c_char, c_void};
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, error};

/// Shared state between the main thread and the render thread.
pub struct RenderShared {
    /// render → main: texture holding the latest frame
    pub display_tex: AtomicU32,
    /// render → main: at least one frame has been produced
    pub has_frame: AtomicBool,
    /// main → render: please exit
    pub quit: AtomicBool,
    /// main → render: drawable size
    pub width: AtomicU32,
    pub height: AtomicU32,
    pub resize: AtomicBool,
    /// render → main: context pointer, for `report_swap`
    pub render_ctx: AtomicPtr<libmpv2_sys::mpv_render_context>,
}

impl RenderShared {
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(RenderShared {
            display_tex: AtomicU32::new(0),
            has_frame: AtomicBool::new(false),
            quit: AtomicBool::new(false),
            width: AtomicU32::new(width),
            height: AtomicU32::new(height),
            resize: AtomicBool::new(false),
            render_ctx: AtomicPtr::new(std::ptr::null_mut()),
        })
    }

    /// Tell the render thread about a new drawable size.
    pub fn resize_to(&self, w: u32, h: u32) {
        if w != self.width.load(Ordering::Relaxed) || h != self.height.load(Ordering::Relaxed) {
            self.width.store(w, Ordering::Relaxed);
            self.height.store(h, Ordering::Relaxed);
            self.resize.store(true, Ordering::Release);
        }
    }

    /// The texture to blit, if mpv has drawn anything yet.
    pub fn frame(&self) -> Option<u32> {
        let tex = self.display_tex.load(Ordering::Acquire);
        (self.has_frame.load(Ordering::Acquire) && tex != 0).then_some(tex)
    }

    pub fn report_swap(&self) {
        let rctx = self.render_ctx.load(Ordering::Acquire);
        if !rctx.is_null() {
            unsafe { libmpv2_sys::mpv_render_context_report_swap(rctx) };
        }
    }
}

unsafe extern "C" fn get_proc(_ctx: *mut c_void, name: *const c_char) -> *mut c_void {
    sdl2_sys::SDL_GL_GetProcAddress(name)
}

unsafe extern "C" fn redraw_cb(ctx: *mut c_void) {
    let flag = &*(ctx as *const AtomicBool);
    flag.store(true, Ordering::Release);
}

unsafe fn alloc_texture(tex: u32, w: u32, h: u32) {
    gl::BindTexture(gl::TEXTURE_2D, tex);
    gl::TexImage2D(
        gl::TEXTURE_2D,
        0,
        gl::RGBA8 as i32,
        w as i32,
        h as i32,
        0,
        gl::RGBA,
        gl::UNSIGNED_BYTE,
        std::ptr::null(),
    );
}

/// Spawns the render thread. Pointers travel as `usize` for `Send`.
pub fn spawn(
    win_ptr: usize,
    gl_ctx_ptr: usize,
    mpv_ptr: usize,
    shared: Arc<RenderShared>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("mpv-render".into())
        .spawn(move || {
            let win = win_ptr as *mut sdl2_sys::SDL_Window;
            let gl_ctx = gl_ctx_ptr as sdl2_sys::SDL_GLContext;
            let mpv_h = mpv_ptr as *mut libmpv2_sys::mpv_handle;
            unsafe { render_loop(win, gl_ctx, mpv_h, &shared) };
        })
}

unsafe fn render_loop(
    win: *mut sdl2_sys::SDL_Window,
    gl_ctx: sdl2_sys::SDL_GLContext,
    mpv_h: *mut libmpv2_sys::mpv_handle,
    shared: &RenderShared,
) {
    sdl2_sys::SDL_GL_MakeCurrent(win, gl_ctx);

    let Ok(api_type) = CString::new("opengl") else {
        return;
    };
    let mut init_params = libmpv2_sys::mpv_opengl_init_params {
        get_proc_address: Some(get_proc),
        get_proc_address_ctx: std::ptr::null_mut(),
    };
    let mut params = [
        libmpv2_sys::mpv_render_param {
            type_: libmpv2_sys::mpv_render_param_type_MPV_RENDER_PARAM_API_TYPE,
            data: api_type.as_ptr() as *mut _,
        },
        libmpv2_sys::mpv_render_param {
            type_: libmpv2_sys::mpv_render_param_type_MPV_RENDER_PARAM_OPENGL_INIT_PARAMS,
            data: &mut init_params as *mut _ as *mut _,
        },
        libmpv2_sys::mpv_render_param {
            type_: libmpv2_sys::mpv_render_param_type_MPV_RENDER_PARAM_INVALID,
            data: std::ptr::null_mut(),
        },
    ];

    let mut render_ctx: *mut libmpv2_sys::mpv_render_context = std::ptr::null_mut();
    let rc = libmpv2_sys::mpv_render_context_create(&mut render_ctx, mpv_h, params.as_mut_ptr());
    if rc < 0 {
        error!("render: mpv_render_context_create failed: {}", rc);
        return;
    }
    shared.render_ctx.store(render_ctx, Ordering::Release);

    let redraw = Box::into_raw(Box::new(AtomicBool::new(false)));
    libmpv2_sys::mpv_render_context_set_update_callback(render_ctx, Some(redraw_cb), redraw as *mut _);

    let mut w = shared.width.load(Ordering::Relaxed);
    let mut h = shared.height.load(Ordering::Relaxed);
    let mut tex = [0u32; 2];
    let mut fbo = [0u32; 2];
    gl::GenTextures(2, tex.as_mut_ptr());
    gl::GenFramebuffers(2, fbo.as_mut_ptr());
    for (t, f) in tex.iter().zip(&fbo) {
        alloc_texture(*t, w, h);
        gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as i32);
        gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as i32);
        gl::BindFramebuffer(gl::FRAMEBUFFER, *f);
        gl::FramebufferTexture2D(gl::FRAMEBUFFER, gl::COLOR_ATTACHMENT0, gl::TEXTURE_2D, *t, 0);
    }
    gl::BindFramebuffer(gl::FRAMEBUFFER, 0);
    gl::BindTexture(gl::TEXTURE_2D, 0);
    debug!("render: started at {}x{}", w, h);

    let mut back = 0usize;
    while !shared.quit.load(Ordering::Relaxed) {
        if shared.resize.swap(false, Ordering::AcqRel) {
            let (nw, nh) = (
                shared.width.load(Ordering::Relaxed),
                shared.height.load(Ordering::Relaxed),
            );
            if (nw, nh) != (w, h) {
                (w, h) = (nw, nh);
                for t in &tex {
                    alloc_texture(*t, w, h);
                }
                gl::BindTexture(gl::TEXTURE_2D, 0);
            }
        }

        if !(*redraw).swap(false, Ordering::AcqRel) {
            std::thread::sleep(std::time::Duration::from_millis(1));
            continue;
        }

        let mut fbo_desc = libmpv2_sys::mpv_opengl_fbo {
            fbo: fbo[back] as i32,
            w: w as i32,
            h: h as i32,
            internal_format: 0,
        };
        let mut flip: i32 = 1;
        // Never block for the A/V target time; the main loop paces frames.
        let mut block_time: i32 = 0;
        let mut render_params = [
            libmpv2_sys::mpv_render_param {
                type_: libmpv2_sys::mpv_render_param_type_MPV_RENDER_PARAM_OPENGL_FBO,
                data: &mut fbo_desc as *mut _ as *mut _,
            },
            libmpv2_sys::mpv_render_param {
                type_: libmpv2_sys::mpv_render_param_type_MPV_RENDER_PARAM_FLIP_Y,
                data: &mut flip as *mut _ as *mut _,
            },
            libmpv2_sys::mpv_render_param {
                type_: libmpv2_sys::mpv_render_param_type_MPV_RENDER_PARAM_BLOCK_FOR_TARGET_TIME,
                data: &mut block_time as *mut _ as *mut _,
            },
            libmpv2_sys::mpv_render_param {
                type_: libmpv2_sys::mpv_render_param_type_MPV_RENDER_PARAM_INVALID,
                data: std::ptr::null_mut(),
            },
        ];
        libmpv2_sys::mpv_render_context_render(render_ctx, render_params.as_mut_ptr());
        // Writes must be visible to the main context before publishing.
        gl::Finish();

        shared.display_tex.store(tex[back], Ordering::Release);
        shared.has_frame.store(true, Ordering::Release);
        back = 1 - back;
    }

    shared.render_ctx.store(std::ptr::null_mut(), Ordering::Release);
    libmpv2_sys::mpv_render_context_set_update_callback(render_ctx, None, std::ptr::null_mut());
    libmpv2_sys::mpv_render_context_free(render_ctx);
    gl::DeleteFramebuffers(2, fbo.as_ptr());
    gl::DeleteTextures(2, tex.as_ptr());
    drop(Box::from_raw(redraw));
    debug!("render: stopped");
}

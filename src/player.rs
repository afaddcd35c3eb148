//! Native host: an SDL2 window where mpv plays the page's active video.
//!
//! The page is a [`Page`] built from files on disk. SDL input becomes
//! controller events, the document's command outbox is mirrored onto mpv and
//! the window, and mpv's observed properties flow back into the document.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use sdl2::event::{Event as SdlEvent, WindowEvent};
use sdl2::keyboard::Keycode;
use sdl2::video::{FullscreenType, GLProfile, Window};

use vspeed::dom::{MediaCommand, NodeId, ReadyState};
use vspeed::keys::{KeyCode, KeyEvent};
use vspeed::settings::Settings;
use vspeed::site::AllowList;
use vspeed::timers::Millis;
use vspeed::{Controller, Event};

use crate::fswatch::{FsEvent, FsWatcher};
use crate::mpv::{MpvEvent, MpvPlayer};
use crate::overlay;
use crate::page::Page;
use crate::quad::QuadRenderer;
use crate::render::{self, RenderShared};

/// SDL keycode → DOM `KeyboardEvent.code` for the keys the controller uses.
pub fn key_code(key: Keycode) -> Option<KeyCode> {
    Some(match key {
        Keycode::Right => KeyCode::ArrowRight,
        Keycode::Left => KeyCode::ArrowLeft,
        Keycode::Up => KeyCode::ArrowUp,
        Keycode::Down => KeyCode::ArrowDown,
        Keycode::Return | Keycode::KpEnter => KeyCode::Enter,
        Keycode::Space => KeyCode::Space,
        Keycode::Equals | Keycode::KpPlus => KeyCode::Equal,
        Keycode::Minus | Keycode::KpMinus => KeyCode::Minus,
        Keycode::RightBracket => KeyCode::BracketRight,
        Keycode::LeftBracket => KeyCode::BracketLeft,
        Keycode::P => KeyCode::KeyP,
        Keycode::Comma => KeyCode::Comma,
        Keycode::Period => KeyCode::Period,
        _ => return None,
    })
}

/// Monotonic milliseconds since the window opened.
struct Clock(Instant);

impl Clock {
    fn now(&self) -> Millis {
        self.0.elapsed().as_millis() as Millis
    }
}

/// One page and the controller driving it, plus which of its videos mpv has
/// loaded.
struct Session {
    page: Page,
    controller: Controller,
    loaded: Option<NodeId>,
}

impl Session {
    fn dispatch(&mut self, now: Millis, event: Event) -> bool {
        self.controller.handle(&mut self.page.doc, now, event)
    }

    fn label(&self, video: NodeId) -> String {
        self.page
            .path_of(video)
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.page.doc.label(video))
    }

    /// Load the active video into mpv if it changed, then mirror queued
    /// writes for the loaded video.
    fn sync(&mut self, mpv: &MpvPlayer, window: &mut Window) {
        let active = self.controller.active_video(&self.page.doc);
        if active != self.loaded {
            match active.and_then(|v| self.page.path_of(v).map(|p| (v, p.to_path_buf()))) {
                Some((video, path)) => {
                    info!("player: loading {}", path.display());
                    mpv.load(&path);
                    // The page autoplays whatever becomes active.
                    self.page.doc.observe_media(video, |m| m.paused = false);
                    if let Some(m) = self.page.doc.media(video) {
                        mpv.set_speed(m.playback_rate);
                        mpv.set_volume(m.volume);
                        mpv.set_pause(m.paused);
                    }
                    self.loaded = Some(video);
                }
                None => {
                    mpv.stop();
                    self.loaded = None;
                }
            }
            let title = match self.loaded {
                Some(v) => format!("{} - vspeed", self.label(v)),
                None => "vspeed".to_string(),
            };
            window.set_title(&title).ok();
        }

        for cmd in self.page.doc.take_commands() {
            self.mirror(cmd, mpv, window);
        }
    }

    fn mirror(&self, cmd: MediaCommand, mpv: &MpvPlayer, window: &mut Window) {
        let loaded = |node: NodeId| self.loaded == Some(node);
        match cmd {
            MediaCommand::SetRate { node, rate } if loaded(node) => mpv.set_speed(rate),
            MediaCommand::Seek { node, time } if loaded(node) => mpv.seek(time),
            MediaCommand::SetVolume { node, volume } if loaded(node) => mpv.set_volume(volume),
            MediaCommand::Play { node } if loaded(node) => mpv.set_pause(false),
            MediaCommand::Pause { node } if loaded(node) => mpv.set_pause(true),
            MediaCommand::EnterFullscreen { .. } => {
                if let Err(e) = window.set_fullscreen(FullscreenType::Desktop) {
                    warn!("player: fullscreen: {}", e);
                }
            }
            MediaCommand::ExitFullscreen => {
                if let Err(e) = window.set_fullscreen(FullscreenType::Off) {
                    warn!("player: fullscreen: {}", e);
                }
            }
            MediaCommand::Click { node } => {
                debug!("player: click on {}", self.page.doc.label(node));
            }
            other => debug!("player: {:?} targets an unloaded video", other),
        }
    }

    /// Fold an mpv observation into the loaded video's state.
    fn observed(&mut self, now: Millis, ev: MpvEvent) {
        let Some(video) = self.loaded else {
            return;
        };
        let doc = &mut self.page.doc;
        match ev {
            MpvEvent::TimePos(t) => {
                doc.observe_media(video, |m| m.current_time = t);
            }
            MpvEvent::Duration(d) => {
                doc.observe_media(video, |m| m.duration = d);
            }
            MpvEvent::Pause(p) => {
                doc.observe_media(video, |m| m.paused = p);
            }
            MpvEvent::Width(w) => {
                doc.observe_media(video, |m| m.width = w.max(0) as u32);
            }
            MpvEvent::Height(h) => {
                doc.observe_media(video, |m| m.height = h.max(0) as u32);
            }
            MpvEvent::FileLoaded => {
                doc.observe_media(video, |m| m.ready_state = ReadyState::HaveEnoughData);
                self.dispatch(now, Event::MediaReady(video));
            }
            MpvEvent::EndFile | MpvEvent::Shutdown => {}
        }
    }

    fn watch(&self, watcher: &FsWatcher) {
        for dir in self.page.dirs() {
            watcher.watch_dir(dir);
        }
    }

    fn unwatch(&self, watcher: &FsWatcher) {
        for dir in self.page.dirs() {
            watcher.unwatch_dir(dir);
        }
    }

    fn fs_event(&mut self, now: Millis, ev: FsEvent) {
        let changed = match &ev {
            FsEvent::Created(p) => self.page.file_created(p).is_some(),
            FsEvent::Removed(p) => self.page.file_removed(p),
        };
        if changed {
            debug!("player: {:?}", ev);
            self.dispatch(now, Event::Mutations);
        }
    }
}

/// Open the window and run until it is closed.
pub fn run(paths: &[PathBuf], origin: Option<&str>, settings: Settings, allow: AllowList) -> Result<(), String> {
    let page = Page::open(paths, origin);
    if page.len() == 0 {
        return Err("no video files to play".into());
    }
    info!("player: {} ({} videos)", page.doc.url(), page.len());
    let controller = Controller::new(&page.doc, settings, &allow);
    if !controller.is_enabled() {
        warn!("player: {} is not on the allow-list", page.doc.origin());
    }
    let mut session = Session {
        page,
        controller,
        loaded: None,
    };

    let (fs_watcher, fs_rx) = FsWatcher::start().map_err(|e| format!("fs watcher: {}", e))?;
    session.watch(&fs_watcher);

    // ── SDL2 + OpenGL ───────────────────────────────────────────────────
    let sdl = sdl2::init()?;
    let video = sdl.video()?;

    let gl_attr = video.gl_attr();
    gl_attr.set_context_profile(GLProfile::Core);
    gl_attr.set_context_version(3, 3);

    let mut window = video
        .window("vspeed", 1280, 720)
        .opengl()
        .resizable()
        .position_centered()
        .build()
        .map_err(|e| e.to_string())?;

    let gl_ctx = window.gl_create_context()?;
    window.gl_make_current(&gl_ctx)?;
    video.gl_set_swap_interval(1).ok();
    gl::load_with(|name| video.gl_get_proc_address(name) as *const _);

    let quad = QuadRenderer::new()?;

    // ── Dear ImGui ──────────────────────────────────────────────────────
    let mut imgui_ctx = imgui::Context::create();
    imgui_ctx.set_ini_filename(None);
    overlay::add_font(&mut imgui_ctx);
    overlay::apply_theme(&mut imgui_ctx);
    let mut imgui_platform = imgui_sdl2_support::SdlPlatform::new(&mut imgui_ctx);
    let glow_ctx =
        unsafe { glow::Context::from_loader_function(|s| video.gl_get_proc_address(s) as _) };
    let mut imgui_renderer = imgui_glow_renderer::AutoRenderer::new(glow_ctx, &mut imgui_ctx)
        .map_err(|e| format!("imgui renderer: {:?}", e))?;

    // ── libmpv + render thread on a shared context ──────────────────────
    let mpv = MpvPlayer::new()?;
    unsafe {
        sdl2_sys::SDL_GL_SetAttribute(sdl2_sys::SDL_GLattr::SDL_GL_SHARE_WITH_CURRENT_CONTEXT, 1);
    }
    let mpv_gl_ctx = window.gl_create_context()?;
    window.gl_make_current(&mpv_gl_ctx)?;
    let mpv_gl_ctx_raw = unsafe { sdl2_sys::SDL_GL_GetCurrentContext() };
    window.gl_make_current(&gl_ctx)?;

    let (w, h) = window.drawable_size();
    let shared = RenderShared::new(w, h);
    let render_thread = render::spawn(
        window.raw() as usize,
        mpv_gl_ctx_raw as usize,
        mpv.handle() as usize,
        shared.clone(),
    )
    .map_err(|e| format!("render thread: {}", e))?;

    // ── Main loop ───────────────────────────────────────────────────────
    let clock = Clock(Instant::now());
    session.dispatch(clock.now(), Event::Start);

    let mut event_pump = sdl.event_pump()?;
    let mut running = true;
    while running {
        let now = clock.now();

        while let Ok(ev) = fs_rx.try_recv() {
            session.fs_event(now, ev);
        }

        for event in event_pump.poll_iter() {
            imgui_platform.handle_event(&mut imgui_ctx, &event);
            let typing = imgui_ctx.io().want_capture_keyboard;
            match event {
                SdlEvent::Quit { .. } => running = false,

                SdlEvent::KeyDown {
                    keycode: Some(Keycode::Escape),
                    ..
                } if !typing => {
                    if session.page.doc.fullscreen().is_some() {
                        session.page.doc.exit_fullscreen();
                    } else {
                        running = false;
                    }
                }
                SdlEvent::KeyDown {
                    keycode: Some(Keycode::Q),
                    ..
                } if !typing => running = false,

                SdlEvent::KeyDown {
                    keycode: Some(key),
                    repeat,
                    ..
                } if !typing => {
                    if let Some(code) = key_code(key) {
                        // The window is the player, so keys land on the active video.
                        let mut ev = KeyEvent::new(code);
                        ev.target = session.controller.active_video(&session.page.doc);
                        if repeat {
                            ev = ev.repeated();
                        }
                        session.dispatch(now, Event::KeyDown(ev));
                    }
                }
                // Releases always go through so a hold can't get stuck
                // behind an imgui text field.
                SdlEvent::KeyUp {
                    keycode: Some(key), ..
                } => {
                    if let Some(code) = key_code(key) {
                        session.dispatch(now, Event::KeyUp(KeyEvent::new(code)));
                    }
                }

                SdlEvent::Window { win_event, .. } => match win_event {
                    WindowEvent::FocusLost => {
                        session.dispatch(now, Event::Blur);
                    }
                    WindowEvent::Minimized | WindowEvent::Hidden => {
                        session.dispatch(now, Event::Hidden);
                    }
                    _ => {}
                },

                SdlEvent::DropFile { filename, .. } => {
                    navigate(&mut session, &fs_watcher, Path::new(&filename), origin, now);
                }

                _ => {}
            }
        }

        for ev in mpv.poll() {
            if ev == MpvEvent::Shutdown {
                running = false;
            }
            session.observed(now, ev);
        }

        session.controller.tick(&mut session.page.doc, now);
        session.sync(&mpv, &mut window);

        // ── Render ──────────────────────────────────────────────────────
        let (w, h) = window.drawable_size();
        shared.resize_to(w, h);
        unsafe {
            gl::BindFramebuffer(gl::FRAMEBUFFER, 0);
            gl::Viewport(0, 0, w as i32, h as i32);
            gl::ClearColor(0.05, 0.05, 0.05, 1.0);
            gl::Clear(gl::COLOR_BUFFER_BIT);
        }
        if session.loaded.is_some() {
            if let Some(tex) = shared.frame() {
                quad.draw_video(tex);
            }
        }

        // ── ImGui overlay ───────────────────────────────────────────────
        imgui_platform.prepare_frame(&mut imgui_ctx, &window, &event_pump);
        let ui = imgui_ctx.new_frame();
        let media = session.loaded.and_then(|v| session.page.doc.media(v));
        let title = session.loaded.map(|v| session.label(v));
        let info = overlay::StatusInfo {
            title: title.as_deref(),
            enabled: session.controller.is_enabled(),
            paused: media.map_or(true, |m| m.paused),
            pos: media.map_or(0.0, |m| m.current_time),
            duration: media.map_or(0.0, |m| m.duration),
            rate: media.map_or(1.0, |m| m.playback_rate),
            hold_rate: session.controller.target_rate(),
            volume: media.map_or(1.0, |m| m.volume),
            videos: session.page.len(),
        };
        overlay::draw_status_bar(ui, &info, w as f32, h as f32);
        overlay::draw_toasts(ui, session.controller.toasts().visible(), w as f32);
        let picked =
            overlay::draw_affordances(ui, session.controller.affordances(), |v| session.label(v));
        let draw_data = imgui_ctx.render();
        imgui_renderer.render(draw_data).ok();

        window.gl_swap_window();
        if session.loaded.is_some() {
            shared.report_swap();
        }

        if let Some(video) = picked {
            session.dispatch(clock.now(), Event::AffordanceClicked(video));
        }

        std::thread::sleep(Duration::from_millis(2));
    }

    // ── Shutdown ────────────────────────────────────────────────────────
    session.controller.teardown(&mut session.page.doc, clock.now());
    session.sync(&mpv, &mut window);
    mpv.stop();
    shared.quit.store(true, std::sync::atomic::Ordering::Release);
    let deadline = Instant::now() + Duration::from_millis(500);
    while !render_thread.is_finished() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    if render_thread.is_finished() {
        render_thread.join().ok();
    }
    drop(fs_watcher);
    mpv.leak();
    Ok(())
}

/// A dropped file or directory replaces the page, like following a link.
fn navigate(session: &mut Session, watcher: &FsWatcher, dropped: &Path, origin: Option<&str>, now: Millis) {
    let page = Page::open(&[dropped.to_path_buf()], origin);
    if page.len() == 0 {
        warn!("drop: no videos in {}", dropped.display());
        return;
    }
    // Navigation restores the old video's rate before the page goes away.
    session.dispatch(now, Event::Navigated(page.doc.url().to_string()));
    session.page.doc.take_commands();
    session.unwatch(watcher);
    session.page = page;
    session.loaded = None;
    session.watch(watcher);
    info!("drop: {} ({} videos)", session.page.doc.url(), session.page.len());
}

//! Dear ImGui overlay: toasts, the status bar and the per-video
//! affordance buttons.

use imgui::{Condition, FontConfig, FontSource, WindowFlags};

use vspeed::dom::NodeId;
use vspeed::selection::Affordance;
use vspeed::toast::rate_label;

pub fn add_font(imgui: &mut imgui::Context) {
    imgui.fonts().add_font(&[FontSource::DefaultFontData {
        config: Some(FontConfig {
            size_pixels: 15.0,
            oversample_h: 2,
            oversample_v: 1,
            pixel_snap_h: true,
            ..Default::default()
        }),
    }]);
}

/// Dark, semi-transparent theme suitable for a player overlay.
pub fn apply_theme(imgui: &mut imgui::Context) {
    let style = imgui.style_mut();
    style.window_rounding = 4.0;
    style.window_border_size = 0.0;
    style.window_padding = [10.0, 6.0];
    style.frame_padding = [6.0, 3.0];
    style.item_spacing = [8.0, 4.0];

    style.colors[imgui::sys::ImGuiCol_WindowBg as usize] = [0.0, 0.0, 0.0, 0.78];
    style.colors[imgui::sys::ImGuiCol_Text as usize] = [0.9, 0.9, 0.9, 1.0];
}

const OVERLAY_FLAGS: WindowFlags = WindowFlags::NO_TITLE_BAR
    .union(WindowFlags::NO_RESIZE)
    .union(WindowFlags::NO_MOVE)
    .union(WindowFlags::NO_SCROLLBAR)
    .union(WindowFlags::NO_SCROLL_WITH_MOUSE)
    .union(WindowFlags::NO_COLLAPSE)
    .union(WindowFlags::NO_SAVED_SETTINGS)
    .union(WindowFlags::NO_FOCUS_ON_APPEARING)
    .union(WindowFlags::NO_NAV)
    .union(WindowFlags::NO_BRING_TO_FRONT_ON_FOCUS);

const DIM: [f32; 4] = [0.50, 0.50, 0.50, 1.0];
const BRIGHT: [f32; 4] = [0.92, 0.92, 0.92, 1.0];
const ACCENT: [f32; 4] = [1.0, 0.40, 0.40, 1.0];

/// Status bar info passed from the main loop.
pub struct StatusInfo<'a> {
    /// File name of the active video, if any.
    pub title: Option<&'a str>,
    pub enabled: bool,
    pub paused: bool,
    pub pos: f64,
    pub duration: f64,
    pub rate: f64,
    pub hold_rate: f64,
    pub volume: f64,
    pub videos: usize,
}

impl StatusInfo<'_> {
    fn right_text(&self) -> String {
        if self.title.is_none() {
            return format!("[{} videos]", self.videos);
        }
        let icon = if self.paused { "||" } else { ">" };
        format!(
            "{} {}/{}  {}  hold {}  Vol: {}%  [{}]",
            icon,
            fmt_time(self.pos),
            fmt_time(self.duration),
            rate_label(self.rate),
            rate_label(self.hold_rate),
            (self.volume * 100.0).round() as i64,
            self.videos,
        )
    }
}

/// Draw the status bar at the bottom of the screen.
/// Layout: [left: file name] [right: > 1:30/5:00  2x  hold 2.5x  Vol: 100%  [3]]
pub fn draw_status_bar(ui: &imgui::Ui, info: &StatusInfo, display_w: f32, display_h: f32) {
    let bar_height = 24.0;
    let pad = 8.0;

    if let Some(_win) = ui
        .window("##statusbar")
        .position([0.0, display_h - bar_height], Condition::Always)
        .size([display_w, bar_height], Condition::Always)
        .bg_alpha(0.78)
        .flags(OVERLAY_FLAGS)
        .begin()
    {
        let y = ui.cursor_pos()[1];
        let right_text = info.right_text();
        let right_w = ui.calc_text_size(&right_text)[0];

        ui.set_cursor_pos([pad, y]);
        match (info.enabled, info.title) {
            (false, _) => ui.text_colored(ACCENT, "disabled for this origin"),
            (true, Some(title)) => ui.text_colored(BRIGHT, title),
            (true, None) => ui.text_colored(DIM, "searching for a video..."),
        }

        ui.set_cursor_pos([display_w - pad - right_w, y]);
        ui.text_colored(BRIGHT, &right_text);
    }
}

/// Draw live toasts stacked near the top centre, each at its own fade.
pub fn draw_toasts<'a>(
    ui: &imgui::Ui,
    toasts: impl Iterator<Item = (&'a str, f32)>,
    display_w: f32,
) {
    let mut y = 24.0;
    for (i, (text, alpha)) in toasts.enumerate() {
        let w = ui.calc_text_size(text)[0] + 24.0;
        let h = 30.0;
        if let Some(_win) = ui
            .window(format!("##toast{}", i))
            .position([(display_w - w) / 2.0, y], Condition::Always)
            .size([w, h], Condition::Always)
            .bg_alpha(0.78 * alpha)
            .flags(OVERLAY_FLAGS)
            .begin()
        {
            let _fade = ui.push_style_var(imgui::StyleVar::Alpha(alpha));
            ui.text(text);
        }
        y += h + 6.0;
    }
}

/// One button per candidate video. Returns the video the user picked.
pub fn draw_affordances(
    ui: &imgui::Ui,
    affordances: &[Affordance],
    label: impl Fn(NodeId) -> String,
) -> Option<NodeId> {
    if affordances.is_empty() {
        return None;
    }
    let mut picked = None;
    if let Some(_win) = ui
        .window("##affordances")
        .position([8.0, 8.0], Condition::Always)
        .always_auto_resize(true)
        .bg_alpha(0.78)
        .flags(OVERLAY_FLAGS.difference(WindowFlags::NO_RESIZE))
        .begin()
    {
        ui.text_colored(DIM, "Control which video?");
        for (i, a) in affordances.iter().enumerate() {
            let marker = if a.active { "*" } else { " " };
            if ui.button(format!("{} {}##aff{}", marker, label(a.video), i)) {
                picked = Some(a.video);
            }
        }
    }
    picked
}

pub fn fmt_time(secs: f64) -> String {
    if secs < 0.0 || !secs.is_finite() {
        return "--:--".to_string();
    }
    let total = secs as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

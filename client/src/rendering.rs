//! Top-down debug viewer

use crate::events::{EffectKind, EffectRequest};
use crate::game::{GameSnapshot, VehicleView};
use crate::network::ConnectionStatus;
use macroquad::prelude::*;
use std::collections::VecDeque;

const FEED_LINES: usize = 5;
const CHAT_LINES: usize = 6;
const EFFECT_SECONDS: f32 = 0.8;

struct ActiveEffect {
    request: EffectRequest,
    started: f64,
}

/// Overlay state the viewer keeps between frames.
pub struct Hud {
    kill_feed: VecDeque<String>,
    chat_log: VecDeque<String>,
    effects: Vec<ActiveEffect>,
}

impl Hud {
    pub fn new() -> Self {
        Self {
            kill_feed: VecDeque::with_capacity(FEED_LINES),
            chat_log: VecDeque::with_capacity(CHAT_LINES),
            effects: Vec::new(),
        }
    }

    pub fn push_kill(&mut self, line: String) {
        push_bounded(&mut self.kill_feed, line, FEED_LINES);
    }

    pub fn push_chat(&mut self, line: String) {
        push_bounded(&mut self.chat_log, line, CHAT_LINES);
    }

    pub fn push_effect(&mut self, request: EffectRequest, now: f64) {
        self.effects.push(ActiveEffect {
            request,
            started: now,
        });
    }

    pub fn kill_feed(&self) -> impl Iterator<Item = &String> + '_ {
        self.kill_feed.iter()
    }

    pub fn chat_log(&self) -> impl Iterator<Item = &String> + '_ {
        self.chat_log.iter()
    }

    fn expire_effects(&mut self, now: f64) {
        self.effects
            .retain(|e| ((now - e.started) as f32) < EFFECT_SECONDS);
    }
}

impl Default for Hud {
    fn default() -> Self {
        Self::new()
    }
}

fn push_bounded(lines: &mut VecDeque<String>, line: String, max: usize) {
    if lines.len() >= max {
        lines.pop_front();
    }
    lines.push_back(line);
}

/// Maps arena coordinates (x, z) to screen pixels, +Z pointing up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenMapping {
    center_x: f32,
    center_y: f32,
    scale: f32,
}

impl ScreenMapping {
    pub fn fit(width: f32, height: f32, arena_size: f32) -> Self {
        Self {
            center_x: width / 2.0,
            center_y: height / 2.0,
            scale: width.min(height) * 0.9 / arena_size.max(1.0),
        }
    }

    pub fn to_screen(&self, x: f32, z: f32) -> (f32, f32) {
        (self.center_x + x * self.scale, self.center_y - z * self.scale)
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }
}

fn color(rgba: [u8; 4]) -> Color {
    Color::from_rgba(rgba[0], rgba[1], rgba[2], rgba[3])
}

pub struct Renderer {
    width: f32,
    height: f32,
}

impl Renderer {
    pub fn new(width: usize, height: usize) -> Self {
        Renderer {
            width: width as f32,
            height: height as f32,
        }
    }

    pub fn render(&mut self, snapshot: &GameSnapshot, hud: &mut Hud, chat_input: Option<&str>) {
        self.width = screen_width();
        self.height = screen_height();
        let mapping = ScreenMapping::fit(self.width, self.height, snapshot.arena_size);

        clear_background(Color::from_rgba(10, 10, 20, 255));
        self.draw_arena(&mapping, snapshot);

        for remote in &snapshot.remotes {
            self.draw_vehicle(&mapping, remote);
        }
        if let Some(local) = &snapshot.local {
            self.draw_vehicle(&mapping, local);
        }

        let now = get_time();
        hud.expire_effects(now);
        self.draw_effects(&mapping, hud, now);
        self.draw_minimap(snapshot);
        self.draw_ui(snapshot, hud, chat_input);
    }

    fn draw_arena(&self, mapping: &ScreenMapping, snapshot: &GameSnapshot) {
        let half = snapshot.arena_size / 2.0;
        let (x0, y0) = mapping.to_screen(-half, half);
        let side = snapshot.arena_size * mapping.scale();
        draw_rectangle(x0, y0, side, side, Color::from_rgba(18, 18, 34, 255));

        // Grid every 50 units, matching the 90° steering.
        let mut line = -half;
        while line <= half {
            let (ax, ay) = mapping.to_screen(line, -half);
            let (bx, by) = mapping.to_screen(line, half);
            draw_line(ax, ay, bx, by, 1.0, Color::from_rgba(30, 30, 60, 255));
            let (ax, ay) = mapping.to_screen(-half, line);
            let (bx, by) = mapping.to_screen(half, line);
            draw_line(ax, ay, bx, by, 1.0, Color::from_rgba(30, 30, 60, 255));
            line += 50.0;
        }
        draw_rectangle_lines(x0, y0, side, side, 3.0, Color::from_rgba(0, 200, 255, 255));

        for portal in &snapshot.portals {
            let (px, py) = mapping.to_screen(
                portal.center.x - portal.half_extents.x,
                portal.center.z + portal.half_extents.z,
            );
            draw_rectangle_lines(
                px,
                py,
                portal.half_extents.x * 2.0 * mapping.scale(),
                portal.half_extents.z * 2.0 * mapping.scale(),
                2.0,
                MAGENTA,
            );
        }
    }

    fn draw_vehicle(&self, mapping: &ScreenMapping, vehicle: &VehicleView) {
        let trail_color = if vehicle.trail_active {
            color(vehicle.trail_color)
        } else {
            Color::from_rgba(120, 120, 120, 120)
        };
        for pair in vehicle.trail.windows(2) {
            let (ax, ay) = mapping.to_screen(pair[0].x, pair[0].z);
            let (bx, by) = mapping.to_screen(pair[1].x, pair[1].z);
            draw_line(ax, ay, bx, by, 2.0, trail_color);
        }
        if let Some(last) = vehicle.trail.last() {
            let (ax, ay) = mapping.to_screen(last.x, last.z);
            let (bx, by) = mapping.to_screen(vehicle.position.x, vehicle.position.z);
            draw_line(ax, ay, bx, by, 2.0, trail_color);
        }

        let (x, y) = mapping.to_screen(vehicle.position.x, vehicle.position.z);
        let radius = if vehicle.jumping { 6.0 } else { 4.0 };
        draw_circle(x, y, radius, color(vehicle.body_color));

        let nose = 10.0;
        draw_line(
            x,
            y,
            x + vehicle.heading.sin() * nose,
            y - vehicle.heading.cos() * nose,
            2.0,
            WHITE,
        );
        draw_text(vehicle.player.as_str(), x + 6.0, y - 6.0, 14.0, LIGHTGRAY);
    }

    fn draw_effects(&self, mapping: &ScreenMapping, hud: &Hud, now: f64) {
        for effect in &hud.effects {
            let t = ((now - effect.started) as f32 / EFFECT_SECONDS).clamp(0.0, 1.0);
            let (x, y) = mapping.to_screen(effect.request.position.x, effect.request.position.z);
            let mut c = color(effect.request.color);
            c.a = 1.0 - t;
            let radius = match effect.request.kind {
                EffectKind::Explosion => 4.0 + 30.0 * t,
                EffectKind::Respawn => 30.0 * (1.0 - t) + 4.0,
            };
            draw_circle_lines(x, y, radius, 2.0, c);
        }
    }

    fn draw_minimap(&self, snapshot: &GameSnapshot) {
        let size = 120.0;
        let x0 = self.width - size - 10.0;
        let y0 = 10.0;
        draw_rectangle(x0, y0, size, size, Color::from_rgba(0, 0, 0, 160));
        draw_rectangle_lines(x0, y0, size, size, 1.0, GRAY);

        let mapping = ScreenMapping {
            center_x: x0 + size / 2.0,
            center_y: y0 + size / 2.0,
            scale: size / snapshot.arena_size.max(1.0),
        };
        for enemy in &snapshot.enemy_positions {
            let (x, y) = mapping.to_screen(enemy.position.x, enemy.position.z);
            draw_circle(x, y, 2.0, RED);
        }
        if let Some(local) = &snapshot.local {
            let (x, y) = mapping.to_screen(local.position.x, local.position.z);
            draw_circle(x, y, 2.5, GREEN);
        }
    }

    fn draw_ui(&self, snapshot: &GameSnapshot, hud: &Hud, chat_input: Option<&str>) {
        let (status, status_color) = match &snapshot.connection {
            ConnectionStatus::Connected => ("connected".to_string(), GREEN),
            ConnectionStatus::Connecting => ("connecting".to_string(), YELLOW),
            ConnectionStatus::Reconnecting { attempt, retry_in } => (
                format!("reconnecting #{} in {:.1}s", attempt, retry_in.as_secs_f32()),
                ORANGE,
            ),
            ConnectionStatus::Disconnected => ("disconnected".to_string(), RED),
        };
        draw_text(&status, 10.0, 20.0, 18.0, status_color);
        draw_text(
            &format!("{:?} | {} remote", snapshot.phase, snapshot.remotes.len()),
            10.0,
            40.0,
            18.0,
            WHITE,
        );

        match (&snapshot.local, snapshot.respawn_in) {
            (Some(local), _) => {
                draw_text(
                    &format!("speed {:.0}", local.speed),
                    10.0,
                    60.0,
                    18.0,
                    WHITE,
                );
                if !local.trail_active {
                    draw_text("grace period", 10.0, 80.0, 18.0, YELLOW);
                }
            }
            (None, Some(remaining)) => {
                let text = format!("respawning in {:.1}s", remaining.as_secs_f32());
                let width = measure_text(&text, None, 32, 1.0).width;
                draw_text(&text, (self.width - width) / 2.0, self.height / 2.0, 32.0, RED);
            }
            (None, None) => {
                let text = "press Enter to start";
                let width = measure_text(text, None, 32, 1.0).width;
                draw_text(text, (self.width - width) / 2.0, self.height / 2.0, 32.0, WHITE);
            }
        }

        let mut y = 150.0;
        for line in hud.kill_feed() {
            draw_text(line, self.width - 260.0, y, 16.0, ORANGE);
            y += 18.0;
        }

        let mut y = self.height - 30.0 - CHAT_LINES as f32 * 18.0;
        for line in hud.chat_log() {
            draw_text(line, 10.0, y, 16.0, LIGHTGRAY);
            y += 18.0;
        }
        if let Some(text) = chat_input {
            draw_text(&format!("> {}_", text), 10.0, self.height - 10.0, 18.0, WHITE);
        }
    }
}

use std::path::Path;
use std::sync::mpsc::{self, TryRecvError};
use std::sync::Arc;

use eframe::egui;

use crate::config::Config;
use crate::disk_info::{self, DiskInfo};
use crate::notify::DefaultNotifier;
use crate::orchestrator::{CancelToken, Orchestrator, Outcome, RunOptions, RunProgress};
use crate::platform::Platform;
use crate::post_run::{finish_run, PostRunOptions};
use crate::report::{render_outcome, Reporter};
use crate::runner::{CommandRunner, SystemRunner};
use crate::schedule::{Frequency, SystemScheduler};
use crate::tasks::{Registry, TaskContext};
use crate::utils;

pub fn launch(config: Config) -> anyhow::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("TidySweep")
            .with_inner_size([720.0, 680.0])
            .with_min_inner_size([520.0, 440.0]),
        ..Default::default()
    };

    eframe::run_native(
        "TidySweep",
        options,
        Box::new(|cc| Ok(Box::new(TidySweepApp::new(cc, config)))),
    )
    .map_err(|e| anyhow::anyhow!("GUI failed: {e}"))
}

fn home_disk() -> Option<DiskInfo> {
    let root = dirs::home_dir().unwrap_or_else(|| std::path::PathBuf::from("/"));
    disk_info::get_disk_info(&root)
}

/// One row of the task checklist.
struct TaskRow {
    name: &'static str,
    applicable: bool,
    selected: bool,
}

/// Messages sent from the worker thread to the UI thread.
enum BgMessage {
    Recorded(Outcome, RunProgress),
    Notice(String),
    Finished(String),
}

/// Forwards orchestrator callbacks over the channel.
struct ChannelReporter {
    tx: mpsc::Sender<BgMessage>,
}

impl Reporter for ChannelReporter {
    fn record(&mut self, outcome: &Outcome, progress: RunProgress) {
        let _ = self.tx.send(BgMessage::Recorded(outcome.clone(), progress));
    }

    fn notice(&mut self, message: &str) {
        let _ = self.tx.send(BgMessage::Notice(message.to_string()));
    }

    fn finalize(&mut self, summary: &str) {
        let _ = self.tx.send(BgMessage::Finished(summary.to_string()));
    }
}

#[derive(PartialEq)]
enum AppPhase {
    Idle,
    Running,
}

struct ConfirmDialog {
    visible: bool,
    unit_labels: Vec<String>,
}

pub struct TidySweepApp {
    platform: Platform,
    tasks: Vec<TaskRow>,
    custom_paths: Vec<String>,
    path_input: String,
    schedule_enabled: bool,
    frequency: Frequency,
    email: String,
    webhook: String,
    config: Config,
    phase: AppPhase,
    receiver: Option<mpsc::Receiver<BgMessage>>,
    cancel: Option<CancelToken>,
    progress: RunProgress,
    log: Vec<String>,
    summary: Option<String>,
    disk: Option<DiskInfo>,
    confirm_dialog: ConfirmDialog,
}

impl TidySweepApp {
    fn new(_cc: &eframe::CreationContext<'_>, config: Config) -> Self {
        let platform = Platform::current();
        let registry = Registry::builtin();
        let tasks = registry
            .tasks()
            .iter()
            .map(|t| TaskRow {
                name: t.name,
                applicable: t.applicable_on(platform),
                selected: t.applicable_on(platform)
                    && config.tasks.iter().any(|n| n == t.name || n == t.slug),
            })
            .collect();

        Self {
            platform,
            tasks,
            custom_paths: config.custom_paths.clone(),
            path_input: String::new(),
            schedule_enabled: false,
            frequency: Frequency::default(),
            email: config.notify.email.clone(),
            webhook: config.notify.webhook.clone(),
            config,
            phase: AppPhase::Idle,
            receiver: None,
            cancel: None,
            progress: RunProgress::default(),
            log: vec![],
            summary: None,
            disk: home_disk(),
            confirm_dialog: ConfirmDialog {
                visible: false,
                unit_labels: vec![],
            },
        }
    }

    fn selected_tasks(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|t| t.selected)
            .map(|t| t.name.to_string())
            .collect()
    }

    fn start_run(&mut self) {
        self.confirm_dialog.visible = false;
        self.phase = AppPhase::Running;
        self.log.clear();
        self.summary = None;

        let selected = self.selected_tasks();
        let paths = self.custom_paths.clone();
        self.progress = RunProgress {
            completed: 0,
            total: selected.len() + paths.len(),
        };

        let post = PostRunOptions {
            schedule: self.schedule_enabled.then_some(self.frequency),
            executable: std::env::current_exe().ok(),
            email: self.email.clone(),
            webhook: self.webhook.clone(),
        };
        let timeout = self.config.timeout();
        let options = RunOptions {
            strict_erase: self.config.strict_erase,
        };
        let smtp = self.config.smtp_settings();
        let platform = self.platform;

        let cancel = CancelToken::default();
        self.cancel = Some(cancel.clone());
        let (tx, rx) = mpsc::channel::<BgMessage>();
        self.receiver = Some(rx);

        std::thread::spawn(move || {
            let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
            let ctx = TaskContext::detect(runner.clone(), timeout);
            let mut reporter = ChannelReporter { tx };

            let report = Orchestrator::new(Registry::builtin(), ctx, options)
                .with_cancel(cancel)
                .run(&selected, &paths, &mut reporter);

            let scheduler = SystemScheduler::new(platform, runner.clone());
            let notifier = DefaultNotifier::new(smtp, runner);
            finish_run(&report, &post, &scheduler, &notifier, &mut reporter);
        });
    }

    fn drain_messages(&mut self) {
        let Some(rx) = &self.receiver else {
            return;
        };
        let mut finished = false;
        loop {
            match rx.try_recv() {
                Ok(BgMessage::Recorded(outcome, progress)) => {
                    self.progress = progress;
                    self.log.push(render_outcome(&outcome));
                }
                Ok(BgMessage::Notice(line)) => self.log.push(line),
                Ok(BgMessage::Finished(summary)) => {
                    self.summary = summary.lines().next().map(str::to_string);
                    finished = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.summary.is_none() {
                        self.log.push("Cleanup stopped unexpectedly".to_string());
                    }
                    finished = true;
                    break;
                }
            }
        }
        if finished {
            self.disk = home_disk();
            self.phase = AppPhase::Idle;
            self.receiver = None;
            self.cancel = None;
        }
    }

    fn show_confirm_dialog(&mut self) {
        let mut unit_labels = self.selected_tasks();
        unit_labels.extend(
            self.custom_paths
                .iter()
                .map(|p| format!("Custom path {}", utils::display_path(Path::new(p)))),
        );
        self.confirm_dialog = ConfirmDialog {
            visible: true,
            unit_labels,
        };
    }

    fn render_header(&self, ui: &mut egui::Ui) {
        ui.add_space(8.0);
        ui.vertical_centered(|ui| {
            ui.heading(
                egui::RichText::new("TidySweep")
                    .size(28.0)
                    .strong()
                    .color(egui::Color32::from_rgb(80, 180, 220)),
            );
            ui.label(
                egui::RichText::new(format!("Cleanup Tool for {}", self.platform))
                    .size(14.0)
                    .color(egui::Color32::GRAY),
            );
        });
        if let Some(disk) = &self.disk {
            ui.add_space(4.0);
            ui.add(
                egui::ProgressBar::new(disk.usage_percent()).text(format!(
                    "Disk: {} free of {}",
                    utils::format_size(disk.available),
                    utils::format_size(disk.total)
                )),
            );
        }
        ui.add_space(8.0);
    }

    fn render_action_bar(&mut self, ui: &mut egui::Ui) {
        let is_busy = self.phase != AppPhase::Idle;

        ui.horizontal(|ui| {
            ui.add_space(4.0);

            let all_selected = self
                .tasks
                .iter()
                .filter(|t| t.applicable)
                .all(|t| t.selected);
            let toggle_label = if all_selected {
                "Deselect All"
            } else {
                "Select All"
            };
            if ui
                .add_enabled(!is_busy, egui::Button::new(toggle_label))
                .clicked()
            {
                for task in self.tasks.iter_mut().filter(|t| t.applicable) {
                    task.selected = !all_selected;
                }
            }

            let has_work =
                self.tasks.iter().any(|t| t.selected) || !self.custom_paths.is_empty();
            let can_run = !is_busy && has_work;
            if ui
                .add_enabled(
                    can_run,
                    egui::Button::new(egui::RichText::new("Run Cleanup").color(if can_run {
                        egui::Color32::from_rgb(220, 60, 60)
                    } else {
                        egui::Color32::GRAY
                    })),
                )
                .clicked()
            {
                self.show_confirm_dialog();
            }

            if is_busy {
                ui.add_space(8.0);
                ui.spinner();
                if let Some(cancel) = &self.cancel {
                    let label = if cancel.is_cancelled() {
                        "Cancelling..."
                    } else {
                        "Cancel"
                    };
                    if ui
                        .add_enabled(!cancel.is_cancelled(), egui::Button::new(label))
                        .clicked()
                    {
                        cancel.cancel();
                    }
                }
            }
        });

        if is_busy || self.summary.is_some() {
            ui.add_space(4.0);
            ui.add(
                egui::ProgressBar::new(self.progress.fraction()).text(format!(
                    "{}/{}",
                    self.progress.completed, self.progress.total
                )),
            );
        }

        if let (Some(summary), AppPhase::Idle) = (&self.summary, &self.phase) {
            ui.horizontal(|ui| {
                ui.add_space(4.0);
                ui.label(
                    egui::RichText::new(summary).color(egui::Color32::from_rgb(80, 200, 80)),
                );
            });
        }

        ui.add_space(4.0);
    }

    fn render_task_list(&mut self, ui: &mut egui::Ui) {
        let enabled = self.phase == AppPhase::Idle;
        let platform = self.platform;
        for task in &mut self.tasks {
            ui.horizontal(|ui| {
                ui.add_enabled(
                    enabled && task.applicable,
                    egui::Checkbox::new(&mut task.selected, task.name),
                );
                if !task.applicable {
                    ui.label(
                        egui::RichText::new(format!("[not supported on {platform}]"))
                            .italics()
                            .color(egui::Color32::GRAY),
                    );
                }
            });
        }
    }

    fn render_custom_paths(&mut self, ui: &mut egui::Ui) {
        let enabled = self.phase == AppPhase::Idle;
        ui.label(egui::RichText::new("Custom paths").strong());
        ui.horizontal(|ui| {
            ui.add_enabled(
                enabled,
                egui::TextEdit::singleline(&mut self.path_input).hint_text("~/Downloads/old"),
            );
            let candidate = self.path_input.trim().to_string();
            if ui
                .add_enabled(enabled && !candidate.is_empty(), egui::Button::new("Add"))
                .clicked()
            {
                if !self.custom_paths.contains(&candidate) {
                    self.custom_paths.push(candidate);
                }
                self.path_input.clear();
            }
        });

        let mut remove = None;
        for (idx, path) in self.custom_paths.iter().enumerate() {
            ui.horizontal(|ui| {
                if ui
                    .add_enabled(enabled, egui::Button::new("Remove").small())
                    .clicked()
                {
                    remove = Some(idx);
                }
                ui.label(
                    egui::RichText::new(path).color(egui::Color32::from_rgb(160, 160, 170)),
                );
            });
        }
        if let Some(idx) = remove {
            self.custom_paths.remove(idx);
        }
    }

    fn render_options(&mut self, ui: &mut egui::Ui) {
        let enabled = self.phase == AppPhase::Idle;
        ui.add_enabled_ui(enabled, |ui| {
            ui.horizontal(|ui| {
                ui.checkbox(&mut self.schedule_enabled, "Schedule periodic run");
                egui::ComboBox::from_id_salt("frequency")
                    .selected_text(self.frequency.label())
                    .show_ui(ui, |ui| {
                        for frequency in Frequency::ALL {
                            ui.selectable_value(&mut self.frequency, frequency, frequency.label());
                        }
                    });
            });
            ui.horizontal(|ui| {
                ui.label("Email report to:");
                ui.add(egui::TextEdit::singleline(&mut self.email).hint_text("SMTP must be configured"));
            });
            ui.horizontal(|ui| {
                ui.label("Webhook URL:");
                ui.text_edit_singleline(&mut self.webhook);
            });
        });
    }

    fn render_log(&self, ui: &mut egui::Ui) {
        if self.log.is_empty() {
            return;
        }
        ui.add_space(4.0);
        egui::CollapsingHeader::new(
            egui::RichText::new(format!("Log ({})", self.log.len()))
                .color(egui::Color32::from_rgb(220, 150, 50)),
        )
        .default_open(true)
        .show(ui, |ui| {
            egui::ScrollArea::vertical()
                .max_height(160.0)
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    for line in &self.log {
                        let color = if line.starts_with("[failed]") || line.contains("failed:") {
                            egui::Color32::from_rgb(220, 100, 50)
                        } else {
                            egui::Color32::from_rgb(160, 160, 170)
                        };
                        ui.label(egui::RichText::new(line).color(color));
                        if line.contains("Full Disk Access")
                            && self.platform == Platform::MacOs
                            && ui.button("Open System Settings").clicked()
                        {
                            let _ = std::process::Command::new("open")
                                .arg("x-apple.systempreferences:com.apple.preference.security?Privacy_AllFiles")
                                .spawn();
                        }
                    }
                });
        });
    }

    fn render_confirm_dialog(&mut self, ctx: &egui::Context) {
        let mut should_run = false;
        let mut should_cancel = false;

        // Dark overlay behind the dialog to block background interaction
        egui::Area::new(egui::Id::new("confirm_overlay"))
            .fixed_pos(egui::Pos2::ZERO)
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                let screen = ui.ctx().screen_rect();
                ui.allocate_rect(screen, egui::Sense::click());
                ui.painter()
                    .rect_filled(screen, 0.0, egui::Color32::from_black_alpha(160));
            });

        egui::Window::new("")
            .title_bar(false)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .fixed_size([360.0, 0.0])
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                ui.add_space(8.0);
                ui.vertical_centered(|ui| {
                    ui.label(
                        egui::RichText::new("\u{26A0}")
                            .size(36.0)
                            .color(egui::Color32::from_rgb(220, 180, 50)),
                    );
                    ui.add_space(4.0);
                    ui.label(egui::RichText::new("Confirm Cleanup").size(18.0).strong());
                });
                ui.add_space(8.0);

                ui.label(format!(
                    "Run {} cleanup units now?",
                    self.confirm_dialog.unit_labels.len()
                ));
                ui.add_space(8.0);

                egui::Frame::group(ui.style())
                    .inner_margin(8.0)
                    .show(ui, |ui| {
                        for label in &self.confirm_dialog.unit_labels {
                            ui.label(format!("\u{2022} {label}"));
                        }
                    });

                ui.add_space(4.0);
                ui.label(
                    egui::RichText::new("This action cannot be undone.")
                        .small()
                        .color(egui::Color32::from_rgb(200, 100, 100)),
                );
                ui.add_space(12.0);

                ui.columns(2, |cols| {
                    cols[0].vertical_centered(|ui| {
                        if ui
                            .add_sized([140.0, 32.0], egui::Button::new("Cancel"))
                            .clicked()
                        {
                            should_cancel = true;
                        }
                    });
                    cols[1].vertical_centered(|ui| {
                        if ui
                            .add_sized(
                                [140.0, 32.0],
                                egui::Button::new(
                                    egui::RichText::new("Run Cleanup")
                                        .strong()
                                        .color(egui::Color32::WHITE),
                                )
                                .fill(egui::Color32::from_rgb(200, 50, 50)),
                            )
                            .clicked()
                        {
                            should_run = true;
                        }
                    });
                });
                ui.add_space(8.0);
            });

        if should_cancel {
            self.confirm_dialog.visible = false;
        }
        if should_run {
            self.start_run();
        }
    }
}

impl eframe::App for TidySweepApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_messages();

        if self.phase != AppPhase::Idle {
            ctx.request_repaint();
        }

        if self.confirm_dialog.visible {
            self.render_confirm_dialog(ctx);
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            self.render_header(ui);
            self.render_action_bar(ui);
            ui.separator();
            egui::ScrollArea::vertical()
                .auto_shrink([false, true])
                .max_height(ui.available_height() * 0.6)
                .show(ui, |ui| {
                    self.render_task_list(ui);
                    ui.separator();
                    self.render_custom_paths(ui);
                });
            ui.separator();
            self.render_options(ui);
            self.render_log(ui);
        });
    }
}

// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2023 Takashi Sakamoto
mod clock;
mod codec;
mod config;
mod model;
mod stream;

use {
    alsactl::{prelude::*, *},
    clap::Parser,
    clock::ClockRatioEndpoint,
    codec::CodecVolumeCtl,
    config::DeviceTreeConfig,
    dionaudio_loco_protocols::StreamParameters,
    glib::{Error, FileError},
    model::*,
    nix::sys::signal,
    runtime_core::{card_cntr::*, cmdline::*, dispatcher::*, LogLevel, *},
    std::{
        path::{Path, PathBuf},
        sync::mpsc,
        time::Duration,
    },
    stream::SubstreamMonitor,
    tracing::{debug, debug_span, warn, Level},
};

enum Event {
    Shutdown,
    Disconnected,
    Elem((ElemId, ElemEventMask)),
    StreamOpened(StreamParameters),
}

enum Model {
    Loco(LocoModel),
    LocoV2(LocoV2Model),
}

struct LocoRuntime {
    unit: LocoUnit,
    model: Model,
    card_cntr: CardCntr,
    rx: mpsc::Receiver<Event>,
    tx: mpsc::SyncSender<Event>,
    dispatchers: Vec<Dispatcher>,
    notified_elems: Vec<ElemId>,
    card_id: u32,
}

impl Drop for LocoRuntime {
    fn drop(&mut self) {
        // At first, stop event loop in all of dispatchers to avoid queueing new events.
        for dispatcher in &mut self.dispatchers {
            dispatcher.stop();
        }

        // Next, consume all events in queue to release blocked thread for sender.
        for _ in self.rx.try_iter() {}

        // Finally Finish I/O threads.
        self.dispatchers.clear();
    }
}

const COMPATIBLE_LOCO: &str = "dionaudio,dionaudio-loco";
const COMPATIBLE_LOCO_V2: &str = "dionaudio,dionaudio-loco-v2";

const SYSFS_PLATFORM_ROOT: &str = "/sys/devices/platform";

impl RuntimeOperation<(u32, PathBuf)> for LocoRuntime {
    fn new((card_id, dt_base): (u32, PathBuf), log_level: Option<LogLevel>) -> Result<Self, Error> {
        if let Some(level) = log_level {
            let fmt_level = match level {
                LogLevel::Debug => Level::DEBUG,
            };
            tracing_subscriber::fmt().with_max_level(fmt_level).init();
        }

        let card_cntr = CardCntr::default();
        card_cntr.card.open(card_id, 0)?;

        let config = DeviceTreeConfig::detect(&dt_base);

        let model = match &config {
            Some(data) => {
                let compatible = data.compatible()?;
                if compatible.iter().any(|tag| tag == COMPATIBLE_LOCO_V2) {
                    Model::LocoV2(LocoV2Model::new(card_id, config.as_ref())?)
                } else if compatible.iter().any(|tag| tag == COMPATIBLE_LOCO) {
                    Model::Loco(LocoModel::new(card_id, config.as_ref())?)
                } else {
                    Err(Error::new(FileError::Nxio, "Not supported."))?
                }
            }
            // No configuration data; the base variant with its static defaults.
            None => Model::Loco(LocoModel::new(card_id, None)?),
        };

        let dai_link = match &model {
            Model::Loco(m) => m.dai_link(),
            Model::LocoV2(m) => m.dai_link(),
        };
        let dai = ClockRatioEndpoint::from_link(dai_link, Path::new(SYSFS_PLATFORM_ROOT))?;
        let codec = CodecVolumeCtl::new(card_id)?;
        let unit = LocoUnit { codec, dai };

        // Use uni-directional channel for communication to child threads.
        let (tx, rx) = mpsc::sync_channel(32);

        Ok(LocoRuntime {
            unit,
            model,
            card_cntr,
            rx,
            tx,
            dispatchers: Default::default(),
            notified_elems: Default::default(),
            card_id,
        })
    }

    fn listen(&mut self) -> Result<(), Error> {
        self.launch_system_event_dispatcher()?;
        self.launch_stream_monitor()?;

        let enter = debug_span!("cache").entered();
        match &mut self.model {
            Model::Loco(m) => m.cache(&mut self.unit),
            Model::LocoV2(m) => m.cache(&mut self.unit),
        }?;
        enter.exit();

        let enter = debug_span!("load").entered();
        match &mut self.model {
            Model::Loco(m) => m.load(&mut self.card_cntr),
            Model::LocoV2(m) => m.load(&mut self.card_cntr),
        }?;

        match &mut self.model {
            Model::Loco(m) => m.get_notified_elem_list(&mut self.notified_elems),
            Model::LocoV2(m) => m.get_notified_elem_list(&mut self.notified_elems),
        }
        enter.exit();

        Ok(())
    }

    fn run(&mut self) -> Result<(), Error> {
        let enter = debug_span!("event").entered();
        loop {
            let ev = match self.rx.recv() {
                Ok(ev) => ev,
                Err(_) => continue,
            };

            match ev {
                Event::Shutdown | Event::Disconnected => break,
                Event::Elem((elem_id, events)) => {
                    let _enter = debug_span!("element").entered();

                    debug!(
                        numid = elem_id.numid(),
                        name = elem_id.name().as_str(),
                        iface = ?elem_id.iface(),
                        index = elem_id.index(),
                    );

                    if let Err(e) = self.unit.codec.enforce(&elem_id) {
                        warn!("Fail to keep the ceiling of digital playback gain: {}", e);
                    }

                    let _ = match &mut self.model {
                        Model::Loco(m) => self.card_cntr.dispatch_elem_event(
                            &mut self.unit,
                            &elem_id,
                            &events,
                            m,
                        ),
                        Model::LocoV2(m) => self.card_cntr.dispatch_elem_event(
                            &mut self.unit,
                            &elem_id,
                            &events,
                            m,
                        ),
                    };
                }
                Event::StreamOpened(params) => {
                    let _enter = debug_span!("stream-open").entered();

                    debug!(physical_width = params.physical_width);

                    let res = match &mut self.model {
                        Model::Loco(m) => self.card_cntr.dispatch_notification(
                            &mut self.unit,
                            &params,
                            &self.notified_elems,
                            m,
                        ),
                        Model::LocoV2(m) => self.card_cntr.dispatch_notification(
                            &mut self.unit,
                            &params,
                            &self.notified_elems,
                            m,
                        ),
                    };
                    if let Err(e) = res {
                        // The attempt to open the stream is aborted; no retry.
                        warn!("Fail to negotiate parameters of stream: {}", e);
                    }
                }
            }
        }
        enter.exit();

        let enter = debug_span!("teardown").entered();
        match &mut self.model {
            Model::Loco(m) => m.teardown(),
            Model::LocoV2(m) => m.teardown(),
        }?;
        enter.exit();

        Ok(())
    }
}

impl LocoRuntime {
    const SYSTEM_DISPATCHER_NAME: &'static str = "system event dispatcher";
    const STREAM_DISPATCHER_NAME: &'static str = "stream monitor dispatcher";

    const STREAM_POLL_INTERVAL: Duration = Duration::from_millis(100);

    fn launch_system_event_dispatcher(&mut self) -> Result<(), Error> {
        let name = Self::SYSTEM_DISPATCHER_NAME.to_string();
        let mut dispatcher = Dispatcher::run(name)?;

        let tx = self.tx.clone();
        dispatcher.attach_signal_handler(signal::Signal::SIGINT, move || {
            let _ = tx.send(Event::Shutdown);
            glib::ControlFlow::Break
        });

        let tx = self.tx.clone();
        dispatcher.attach_snd_card(&self.card_cntr.card, move |_| {
            let _ = tx.send(Event::Disconnected);
        })?;

        let tx = self.tx.clone();
        self.card_cntr
            .card
            .connect_handle_elem_event(move |_, elem_id, events| {
                let _ = tx.send(Event::Elem((elem_id.clone(), events)));
            });

        self.dispatchers.push(dispatcher);

        Ok(())
    }

    fn launch_stream_monitor(&mut self) -> Result<(), Error> {
        let name = Self::STREAM_DISPATCHER_NAME.to_string();
        let mut dispatcher = Dispatcher::run(name)?;

        let tx = self.tx.clone();
        let mut monitor = SubstreamMonitor::new(self.card_id);
        dispatcher.attach_interval_handler(Self::STREAM_POLL_INTERVAL, move || {
            match monitor.poll() {
                Ok(Some(params)) => {
                    let _ = tx.send(Event::StreamOpened(params));
                }
                Ok(None) => (),
                Err(e) => debug!("Fail to poll state of substream: {}", e),
            }
            glib::ControlFlow::Continue
        });

        self.dispatchers.push(dispatcher);

        Ok(())
    }
}

struct LocoServiceCmd;

#[derive(Parser)]
#[clap(name = "snd-dionaudio-loco-ctl-service")]
struct Arguments {
    /// The numeric identifier of sound card in Linux sound subsystem.
    card_id: u32,

    /// The path to base directory of flattened device tree.
    #[clap(long, default_value = "/proc/device-tree")]
    dt_base: PathBuf,

    /// The level to debug runtime, disabled as a default.
    #[clap(long, short, value_enum)]
    log_level: Option<LogLevel>,
}

impl ServiceCmd<Arguments, (u32, PathBuf), LocoRuntime> for LocoServiceCmd {
    fn params(args: &Arguments) -> ((u32, PathBuf), Option<LogLevel>) {
        ((args.card_id, args.dt_base.clone()), args.log_level)
    }
}

fn main() {
    LocoServiceCmd::run()
}

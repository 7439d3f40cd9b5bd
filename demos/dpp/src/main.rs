use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use qp_core::{priority, Hooks};
use qp_qf::{Framework, FrameworkConfig};
use qp_qk::QkKernel;
use qp_qs::{filters, Tracer, UdpSink};
use qp_qv::QvKernel;
use qp_qxk::QxkKernel;

use qp_dpp::{SharedStats, MAX_SIG, TABLE, TOGGLE};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KernelKind {
    Qv,
    Qk,
    Qxk,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Dining philosophers on a QP kernel")]
struct Opts {
    #[arg(long, value_enum, default_value = "qv")]
    kernel: KernelKind,

    /// Clock ticks to run before stopping
    #[arg(long, default_value_t = 500)]
    ticks: u32,

    #[arg(long, default_value_t = 10, value_name = "MS")]
    tick_ms: u64,

    /// Pauses or resumes the table every this many ticks, 0 to never
    #[arg(long, default_value_t = 0)]
    toggle_every: u32,

    /// Sends QS traces to a qspy instance
    #[arg(long, value_name = "HOST:PORT")]
    qs: Option<String>,
}

struct DemoHooks {
    qs: Option<(Arc<Tracer>, UdpSink)>,
}

impl DemoHooks {
    fn flush(&self) {
        if let Some((tracer, sink)) = &self.qs {
            if let Err(err) = sink.flush(tracer) {
                log::warn!("{err}");
            }
        }
    }
}

impl Hooks for DemoHooks {
    fn on_startup(&self) {
        log::info!("dinner is served");
    }

    fn on_idle(&self) {
        self.flush();
        thread::sleep(Duration::from_millis(1));
    }

    fn on_cleanup(&self) {
        self.flush();
        log::info!("dinner is over");
    }
}

fn connect_qs(addr: &str) -> Result<(Arc<Tracer>, UdpSink)> {
    let addr = addr
        .to_socket_addrs()
        .with_context(|| format!("resolving {addr}"))?
        .next()
        .with_context(|| format!("no address for {addr}"))?;
    let sink = UdpSink::connect(&addr.ip().to_string(), addr.port())?;
    let tracer = Arc::new(Tracer::new(16 * 1024));
    tracer.global_filter(filters::ALL, true);
    Ok((tracer, sink))
}

/// Runs the clock on its own thread, then stops the framework.
fn spawn_clock(
    fw: Arc<Framework>,
    opts: &Opts,
    interrupt: impl Fn(&dyn Fn(&Arc<Framework>)) + Send + 'static,
) -> thread::JoinHandle<()> {
    let (ticks, period, toggle_every) = (opts.ticks, opts.tick_ms, opts.toggle_every);
    thread::spawn(move || {
        for n in 1..=ticks {
            thread::sleep(Duration::from_millis(period));
            interrupt(&|fw| fw.tick(0));
            if toggle_every != 0 && n % toggle_every == 0 {
                interrupt(&|fw| fw.post(TABLE, fw.new_event(TOGGLE, &[])));
            }
        }
        fw.stop();
    })
}

fn report(stats: &SharedStats) {
    let stats = stats.lock();
    for (n, meals) in stats.meals.iter().enumerate() {
        log::info!("philosopher {n} ate {meals} times");
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opts = Opts::parse();

    let qs = opts.qs.as_deref().map(connect_qs).transpose()?;
    let mut config = FrameworkConfig::builder()
        .name("dpp")
        .max_signal(MAX_SIG)
        .pool(8, 32);
    if let Some((tracer, _)) = &qs {
        config = config.tracer(Arc::clone(tracer));
    }
    let fw = Framework::new(config.hooks(DemoHooks { qs }).build());

    let stats = SharedStats::default();
    qp_dpp::start(&fw, &stats);
    log::info!("running on {:?} for {} ticks", opts.kernel, opts.ticks);

    let clock = match opts.kernel {
        KernelKind::Qv => {
            let kernel = QvKernel::new(Arc::clone(&fw));
            let clock = spawn_clock(Arc::clone(&fw), &opts, {
                let fw = Arc::clone(&fw);
                move |isr: &dyn Fn(&Arc<Framework>)| isr(&fw)
            });
            kernel.run();
            clock
        }
        KernelKind::Qk => {
            let kernel = Arc::new(QkKernel::new(Arc::clone(&fw)));
            let clock = spawn_clock(Arc::clone(&fw), &opts, {
                let kernel = Arc::clone(&kernel);
                move |isr: &dyn Fn(&Arc<Framework>)| kernel.isr(|fw| isr(fw))
            });
            kernel.run();
            clock
        }
        KernelKind::Qxk => {
            let kernel = Arc::new(QxkKernel::new(Arc::clone(&fw)));
            let watched = Arc::clone(&stats);
            kernel.start_thread(priority!(7), 2, move |ctx| async move {
                while ctx.delay(100).await {
                    let meals: u32 = watched.lock().meals.iter().sum();
                    log::info!("{meals} meals so far");
                }
            });
            let clock = spawn_clock(Arc::clone(&fw), &opts, {
                let kernel = Arc::clone(&kernel);
                move |isr: &dyn Fn(&Arc<Framework>)| kernel.isr(|fw| isr(fw))
            });
            kernel.run();
            clock
        }
    };

    clock
        .join()
        .map_err(|_| anyhow::anyhow!("clock thread panicked"))?;
    report(&stats);
    Ok(())
}

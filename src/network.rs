//! Installs bridged nodes onto one shared medium.
//!
//! Every node gets the full stack:
//!
//! ```text
//! external process <-socket-> ExternalProcessLink -> PassthroughMac -> RadioPhy -> SharedMedium
//! ```
//!
//! The link bridges itself, so frames from the process go straight into the
//! emulated radio and frames the radio receives go straight back out.

use std::path::PathBuf;
use std::rc::Rc;

use log::{info, warn};

use crate::address::AddressAllocator;
use crate::bridge::{ExternalProcessLink, OverlayMode};
use crate::common::scene::{self, Scene};
use crate::control::BridgeConfig;
use crate::device::NetDevice;
use crate::error::{BridgeError, BridgeResult};
use crate::propagation::{ConstantPosition, ConstantSpeedDelay, LogDistanceLoss, Position, PropagationDelayModel, PropagationLossModel};
use crate::radio::{PassthroughMac, PathLossParameters, PhyMode, RadioPhy, SharedMedium};
use crate::simulation::{NodeId, Simulator};

/// Per-node settings applied by [`Network::install_node`].
#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub exec_path: PathBuf,
    pub mode: OverlayMode,
    pub phy_mode: PhyMode,
    pub tx_power_dbm: f64,
}

impl NodeSettings {
    /// Scene entries override the bridge configuration.
    pub fn resolve(config: &BridgeConfig, node: &scene::Node) -> BridgeResult<Self> {
        let exec_path = match (&node.exec_path, &config.exec_path) {
            (Some(path), _) => PathBuf::from(path),
            (None, Some(path)) => path.clone(),
            (None, None) => {
                return Err(BridgeError::InvalidParameter(format!(
                    "node {} has no exec_path and the configuration sets none",
                    node.node_id
                )));
            }
        };
        Ok(NodeSettings {
            exec_path,
            mode: config.mode,
            phy_mode: node.phy_mode.unwrap_or(config.phy_mode),
            tx_power_dbm: node.tx_power_dbm.unwrap_or(config.tx_power_dbm),
        })
    }
}

/// One installed node and its stack.
pub struct BridgeNode {
    pub id: NodeId,
    pub link: Rc<ExternalProcessLink>,
    pub mac: Rc<PassthroughMac>,
    pub phy: Rc<RadioPhy>,
    pub mobility: Rc<ConstantPosition>,
}

pub struct Network {
    medium: Rc<SharedMedium>,
    allocator: Rc<AddressAllocator>,
    nodes: Vec<BridgeNode>,
}

impl Network {
    pub fn new(loss: Rc<dyn PropagationLossModel>, delay: Rc<dyn PropagationDelayModel>) -> Self {
        Network {
            medium: Rc::new(SharedMedium::with_models(loss, delay)),
            allocator: Rc::new(AddressAllocator::new()),
            nodes: Vec::new(),
        }
    }

    /// A network over a log-distance channel with constant-speed propagation.
    pub fn log_distance(params: PathLossParameters, shadowing_seed: Option<u64>, speed: Option<f64>) -> BridgeResult<Self> {
        let loss = match shadowing_seed {
            Some(seed) => LogDistanceLoss::with_seed(params, seed)?,
            None => LogDistanceLoss::new(params)?,
        };
        let delay = match speed {
            Some(speed) => ConstantSpeedDelay::new(speed)?,
            None => ConstantSpeedDelay::default(),
        };
        Ok(Self::new(Rc::new(loss), Rc::new(delay)))
    }

    /// Build every node of `scene` with the settings of `config`.
    pub fn from_scene(scene: &Scene, config: &BridgeConfig) -> BridgeResult<Self> {
        config.check_schedule(scene.nodes.len()).map_err(BridgeError::InvalidParameter)?;
        let mut network = Self::log_distance(scene.path_loss_parameters.clone(), scene.shadowing_seed, scene.propagation_speed)?;
        for node in &scene.nodes {
            let settings = NodeSettings::resolve(config, node)?;
            network.install_node(NodeId::new(node.node_id), node.position, &settings)?;
        }
        info!("Installed {} nodes", network.nodes.len());
        Ok(network)
    }

    /// Create a node's link, MAC and PHY, wire them together and attach the PHY
    /// to the medium.
    pub fn install_node(&mut self, id: NodeId, position: Position, settings: &NodeSettings) -> BridgeResult<&BridgeNode> {
        if self.node(id).is_some() {
            return Err(BridgeError::InvalidParameter(format!("node {} is already installed", id)));
        }
        if !position.is_finite() {
            return Err(BridgeError::InvalidParameter(format!("node {} has a non-finite position", id)));
        }

        let link = Rc::new(ExternalProcessLink::new(id, self.allocator.clone()));
        link.set_exec_path(settings.exec_path.clone());
        link.set_mode(settings.mode);
        if settings.mode == OverlayMode::Unset {
            warn!("{}: overlay mode unset, frames are forwarded without address learning", id);
        }
        let device: Rc<dyn NetDevice> = link.clone();
        link.set_bridged_device(&device)?;

        let mac = Rc::new(PassthroughMac::new(id));
        let phy = Rc::new(RadioPhy::new(id));
        let mobility = Rc::new(ConstantPosition::new(position));
        phy.set_mode(settings.phy_mode);
        phy.set_tx_power_dbm(settings.tx_power_dbm);
        phy.set_mobility(mobility.clone());
        phy.attach_to(&self.medium);

        mac.set_phy(phy.clone());
        mac.set_link(&link);
        link.set_mac(mac.clone());
        link.set_phy(phy.clone());

        info!(
            "{}: installed at ({:.1}, {:.1}, {:.1}) running {} ({:?}, {} dBm)",
            id,
            position.x,
            position.y,
            position.z,
            settings.exec_path.display(),
            settings.phy_mode,
            settings.tx_power_dbm
        );
        self.nodes.push(BridgeNode { id, link, mac, phy, mobility });
        Ok(&self.nodes[self.nodes.len() - 1])
    }

    /// Schedule every link's start and, if configured, its stop. Nothing is
    /// scheduled if a staggered start would fall after the stop.
    pub fn schedule_lifecycle(&self, sim: &mut Simulator, config: &BridgeConfig) -> BridgeResult<()> {
        config.check_schedule(self.nodes.len()).map_err(BridgeError::InvalidParameter)?;
        for (index, node) in self.nodes.iter().enumerate() {
            node.link.start(sim, config.start_delay(index));
            if let Some(stop) = config.stop_delay() {
                node.link.stop(sim, stop);
            }
        }
        Ok(())
    }

    pub fn medium(&self) -> &Rc<SharedMedium> {
        &self.medium
    }

    pub fn nodes(&self) -> &[BridgeNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&BridgeNode> {
        self.nodes.iter().find(|node| node.id == id)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::bridge::LinkState;
    use crate::propagation::FixedRssLoss;
    use crate::simulation::ClockMode;
    use crate::test_support::{subprocess_guard, write_script};

    fn settings(exec_path: PathBuf) -> NodeSettings {
        NodeSettings {
            exec_path,
            mode: OverlayMode::PhyOverlay,
            phy_mode: PhyMode::DsssOqpskGhz,
            tx_power_dbm: 0.0,
        }
    }

    #[test]
    fn install_wires_the_stack() {
        let mut network = Network::new(Rc::new(FixedRssLoss::new(-60.0).unwrap()), Rc::new(ConstantSpeedDelay::default()));
        let node = network
            .install_node(NodeId::new(4), Position::new(1.0, 2.0, 0.0), &settings(PathBuf::from("/bin/true")))
            .unwrap();

        assert_eq!(node.link.mode(), OverlayMode::PhyOverlay);
        assert_eq!(node.link.exec_path(), PathBuf::from("/bin/true"));
        assert!(Rc::ptr_eq(&node.link.mac().unwrap(), &node.mac));
        assert!(Rc::ptr_eq(&node.link.phy().unwrap(), &node.phy));
        assert!(Rc::ptr_eq(&node.mac.phy().unwrap(), &node.phy));
        assert_eq!(node.phy.tx_power_dbm(), 0.0);
        assert_eq!(node.phy.mobility().unwrap().position(), Position::new(1.0, 2.0, 0.0));
        let bridged = node.link.bridged_device().unwrap();
        assert_eq!(bridged.node(), NodeId::new(4));
        assert_eq!(network.medium().len(), 1);
    }

    #[test]
    fn duplicate_and_invalid_nodes_are_rejected() {
        let mut network = Network::log_distance(PathLossParameters::default(), Some(1), None).unwrap();
        let s = settings(PathBuf::from("/bin/true"));
        network.install_node(NodeId::new(1), Position::default(), &s).unwrap();
        assert!(network.install_node(NodeId::new(1), Position::default(), &s).is_err());
        assert!(network.install_node(NodeId::new(2), Position::new(f64::NAN, 0.0, 0.0), &s).is_err());
        assert_eq!(network.nodes().len(), 1);
        assert!(Network::log_distance(PathLossParameters::default(), None, Some(-1.0)).is_err());
    }

    #[test]
    fn scene_entries_override_config() {
        let scene = scene::parse_scene(
            r#"{ "nodes": [
                { "node_id": 0, "position": { "x": 0, "y": 0 } },
                { "node_id": 1, "position": { "x": 5, "y": 0 }, "tx_power_dbm": 3, "phy_mode": "dsss-bpsk", "exec_path": "/bin/cat" }
            ] }"#,
        )
        .unwrap();
        let config = BridgeConfig::parse("exec-path = \"/bin/true\"\nmode = \"MACPHYOVERLAY\"\ntx-power-dbm = 7").unwrap();
        let network = Network::from_scene(&scene, &config).unwrap();

        let first = network.node(NodeId::new(0)).unwrap();
        assert_eq!(first.link.exec_path(), PathBuf::from("/bin/true"));
        assert_eq!(first.phy.tx_power_dbm(), 7.0);
        assert_eq!(first.phy.mode(), PhyMode::DsssOqpskGhz);
        assert_eq!(first.link.mode(), OverlayMode::MacPhyOverlay);

        let second = network.node(NodeId::new(1)).unwrap();
        assert_eq!(second.link.exec_path(), PathBuf::from("/bin/cat"));
        assert_eq!(second.phy.tx_power_dbm(), 3.0);
        assert_eq!(second.phy.mode(), PhyMode::DsssBpsk);

        let no_exec = BridgeConfig::parse("").unwrap();
        assert!(matches!(Network::from_scene(&scene, &no_exec), Err(BridgeError::InvalidParameter(_))));
    }

    #[test]
    fn lifecycle_is_staggered() {
        let scene = scene::parse_scene(
            r#"{ "nodes": [
                { "node_id": 0, "position": { "x": 0, "y": 0 } },
                { "node_id": 1, "position": { "x": 1, "y": 0 } },
                { "node_id": 2, "position": { "x": 2, "y": 0 } }
            ] }"#,
        )
        .unwrap();
        let config = BridgeConfig::parse("exec-path = \"/bin/true\"\nstart-offset-ms = 10\nstagger-ms = 5\nstop-offset-ms = 100").unwrap();
        let network = Network::from_scene(&scene, &config).unwrap();
        let mut sim = Simulator::new();
        network.schedule_lifecycle(&mut sim, &config).unwrap();
        assert_eq!(sim.pending_events(), 6);

        let mut no_stop = config.clone();
        no_stop.stop_offset_ms = None;
        let mut sim = Simulator::new();
        network.schedule_lifecycle(&mut sim, &no_stop).unwrap();
        assert_eq!(sim.pending_events(), 3);
    }

    #[test]
    fn starts_after_the_stop_are_rejected() {
        let scene = scene::parse_scene(
            r#"{ "nodes": [
                { "node_id": 0, "position": { "x": 0, "y": 0 } },
                { "node_id": 1, "position": { "x": 1, "y": 0 } }
            ] }"#,
        )
        .unwrap();
        let late = BridgeConfig::parse("exec-path = \"/bin/true\"\nstart-offset-ms = 0\nstagger-ms = 50\nstop-offset-ms = 20").unwrap();
        assert!(matches!(Network::from_scene(&scene, &late), Err(BridgeError::InvalidParameter(_))));

        let mut network = Network::new(Rc::new(FixedRssLoss::new(-60.0).unwrap()), Rc::new(ConstantSpeedDelay::default()));
        for (id, x) in [(0, 0.0), (1, 1.0)] {
            network.install_node(NodeId::new(id), Position::new(x, 0.0, 0.0), &settings(PathBuf::from("/bin/true"))).unwrap();
        }
        let mut sim = Simulator::new();
        assert!(matches!(network.schedule_lifecycle(&mut sim, &late), Err(BridgeError::InvalidParameter(_))));
        assert_eq!(sim.pending_events(), 0);
    }

    #[test]
    fn frame_crosses_the_medium_between_two_processes() {
        let _g = subprocess_guard();
        let payload = b"abcdefghijklmnopqrst";
        let sender_script = write_script("sender", "printf 'abcdefghijklmnopqrst' >&0; exec cat > \"$0.out\"");
        let receiver_script = write_script("receiver", "exec cat > \"$0.out\"");
        let receiver_out = PathBuf::from(format!("{}.out", receiver_script.display()));
        let sender_out = PathBuf::from(format!("{}.out", sender_script.display()));

        let mut network = Network::log_distance(PathLossParameters::default(), Some(7), None).unwrap();
        let a = NodeId::new(0);
        let b = NodeId::new(1);
        network.install_node(a, Position::new(0.0, 0.0, 0.0), &settings(sender_script)).unwrap();
        network.install_node(b, Position::new(300.0, 0.0, 0.0), &settings(receiver_script)).unwrap();
        for node in network.nodes() {
            node.phy.set_tx_power_dbm(65.0);
        }

        let sent_at = Rc::new(Cell::new(None));
        let s = sent_at.clone();
        network.node(a).unwrap().mac.tx_trace().connect(move |trace| s.set(Some(trace.time)));
        let received_at = Rc::new(Cell::new(None));
        let r = received_at.clone();
        network.node(b).unwrap().mac.rx_trace().connect(move |trace| r.set(Some(trace.time)));

        // Both links start at 0 and the receiver's start event runs before
        // anything the sender's process writes is injected.
        let config = BridgeConfig {
            stop_offset_ms: Some(300),
            ..BridgeConfig::default()
        };
        let mut sim = Simulator::with_clock(ClockMode::Realtime);
        network.schedule_lifecycle(&mut sim, &config).unwrap();
        sim.run().unwrap();

        let (node_a, node_b) = (network.node(a).unwrap(), network.node(b).unwrap());
        assert_eq!(node_a.link.state(), LinkState::Stopped);
        assert_eq!(node_b.link.state(), LinkState::Stopped);

        let sent_at = sent_at.get().expect("the sender's process frame never reached its MAC");
        let delay = ConstantSpeedDelay::default().delay(node_a.mobility.as_ref(), node_b.mobility.as_ref());
        let expected = sent_at + delay + node_b.phy.tx_duration(payload.len());
        assert_eq!(received_at.get(), Some(expected));

        assert_eq!(std::fs::read(&receiver_out).unwrap(), payload);
        assert!(std::fs::read(&sender_out).unwrap().is_empty());
    }
}

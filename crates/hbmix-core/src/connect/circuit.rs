//! Circuit composition
//!
//! A [`Circuit`] collects devices, port-to-port connections and the ordered
//! list of ports it exposes. On first evaluation it grows a binary merge tree
//! in an arena: leaves are the user devices, internal nodes are intra-,
//! inter- or union-connections. The tree is rebuilt whenever the connection
//! or exposure lists change.

use std::cell::RefCell;
use std::rc::Rc;

use crate::context::{EvalContext, Parameter};
use crate::device::{AsDevice, ComputeMode, DataCache, Device, DeviceFlags, DeviceRef};
use crate::error::{Error, Result};
use crate::port::{DeviceId, Port};
use crate::sdata::ScatteringData;

use super::algebra::{block_union, interconnect, intraconnect};

type NodeId = usize;

#[derive(Clone)]
enum NodeKind {
    Leaf(DeviceRef),
    Intra { child: NodeId, k: usize, l: usize },
    Inter { a: NodeId, k: usize, b: NodeId, l: usize },
    Union { a: NodeId, b: NodeId },
}

#[derive(Clone)]
struct Node {
    kind: NodeKind,
    /// Identity of each output port, in the node's own order
    ports: Vec<Port>,
    /// Any leaf below may carry noise; selects the connection noise case
    noisy: bool,
}

/// Arena of merge nodes plus the map from exposed ports to root ports
struct MergeTree {
    nodes: Vec<Node>,
    root: Option<NodeId>,
    /// `exposure[i]` is the root port index of exposed port `i`
    exposure: Vec<usize>,
}

impl MergeTree {
    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn owner_of(&self, live: &[NodeId], port: Port) -> Option<(usize, usize)> {
        live.iter().enumerate().find_map(|(slot, &id)| {
            self.nodes[id]
                .ports
                .iter()
                .position(|p| *p == port)
                .map(|index| (slot, index))
        })
    }

    fn connect(&mut self, live: &mut Vec<NodeId>, p1: Port, p2: Port) -> Result<()> {
        let (slot1, k) = self.owner_of(live, p1).ok_or(Error::PortInUse(p1))?;
        let (slot2, l) = self.owner_of(live, p2).ok_or(Error::PortInUse(p2))?;

        if slot1 == slot2 {
            let child = live[slot1];
            let node = &self.nodes[child];
            let ports = node
                .ports
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != k && i != l)
                .map(|(_, p)| *p)
                .collect();
            let noisy = node.noisy;
            let id = self.push(Node {
                kind: NodeKind::Intra { child, k, l },
                ports,
                noisy,
            });
            live[slot1] = id;
        } else {
            let a = live[slot1];
            let b = live[slot2];
            let na = &self.nodes[a];
            let nb = &self.nodes[b];
            let ports = na
                .ports
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != k)
                .map(|(_, p)| *p)
                .chain(
                    nb.ports
                        .iter()
                        .enumerate()
                        .filter(|&(i, _)| i != l)
                        .map(|(_, p)| *p),
                )
                .collect();
            let noisy = na.noisy || nb.noisy;
            let id = self.push(Node {
                kind: NodeKind::Inter { a, k, b, l },
                ports,
                noisy,
            });
            live[slot1] = id;
            live.remove(slot2);
        }
        Ok(())
    }

    fn union(&mut self, a: NodeId, b: NodeId) -> NodeId {
        let ports = self.nodes[a]
            .ports
            .iter()
            .chain(self.nodes[b].ports.iter())
            .copied()
            .collect();
        let noisy = self.nodes[a].noisy || self.nodes[b].noisy;
        self.push(Node {
            kind: NodeKind::Union { a, b },
            ports,
            noisy,
        })
    }

    fn eval(&self, id: NodeId, ctx: &EvalContext, mode: ComputeMode) -> Result<Rc<ScatteringData>> {
        let z = ctx.z_normal();
        let data = match &self.nodes[id].kind {
            NodeKind::Leaf(device) => {
                let data = device.get_data(ctx, mode)?;
                if data.z_norm == z || data.z_norm == 0.0 {
                    return Ok(data);
                }
                data.renormalized(z)?
            }
            NodeKind::Intra { child, k, l } => {
                let noisy = self.nodes[*child].noisy;
                let d = self.eval(*child, ctx, mode)?;
                intraconnect(&d, *k, *l, noisy, mode)
            }
            NodeKind::Inter { a, k, b, l } => {
                let noisy = (self.nodes[*a].noisy, self.nodes[*b].noisy);
                let da = self.eval(*a, ctx, mode)?;
                let db = self.eval(*b, ctx, mode)?;
                interconnect(&da, *k, &db, *l, noisy, mode)
            }
            NodeKind::Union { a, b } => {
                let da = self.eval(*a, ctx, mode)?;
                let db = self.eval(*b, ctx, mode)?;
                block_union(&da, &db, mode)
            }
        };
        let mut data = data;
        data.z_norm = z;
        Ok(Rc::new(data))
    }
}

/// A composite network built from other devices
pub struct Circuit {
    id: DeviceId,
    devices: Vec<DeviceRef>,
    connections: Vec<(Port, Port)>,
    exposed: Vec<Port>,
    temperature: Option<Rc<Parameter>>,
    tree: RefCell<Option<Rc<MergeTree>>>,
    cache: DataCache,
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new()
    }
}

impl Circuit {
    pub fn new() -> Self {
        Self {
            id: DeviceId::next(),
            devices: Vec::new(),
            connections: Vec::new(),
            exposed: Vec::new(),
            temperature: None,
            tree: RefCell::new(None),
            cache: DataCache::new(),
        }
    }

    fn invalidate(&mut self) {
        *self.tree.get_mut() = None;
        self.cache.clear();
    }

    fn register(&mut self, device: DeviceRef, index: usize) -> Result<Port> {
        if index >= device.size() {
            return Err(Error::UnknownPort(Port::new(device.id(), index)));
        }
        let port = Port::new(device.id(), index);
        if !self.devices.iter().any(|d| d.id() == device.id()) {
            self.devices.push(device);
        }
        Ok(port)
    }

    /// Add a device without connecting it yet
    pub fn add_device(&mut self, device: &impl AsDevice) {
        let device = device.as_device();
        if !self.devices.iter().any(|d| d.id() == device.id()) {
            self.devices.push(device);
            self.invalidate();
        }
    }

    /// Tie port `port_a` of `dev_a` to port `port_b` of `dev_b`
    pub fn connect(
        &mut self,
        dev_a: &impl AsDevice,
        port_a: usize,
        dev_b: &impl AsDevice,
        port_b: usize,
    ) -> Result<()> {
        let p1 = self.register(dev_a.as_device(), port_a)?;
        let p2 = self.register(dev_b.as_device(), port_b)?;
        if p1 == p2 {
            return Err(Error::SelfConnection(p1));
        }
        self.connections.push((p1, p2));
        self.invalidate();
        Ok(())
    }

    /// Expose port `port` of `device` as the next port of the circuit
    pub fn add_port(&mut self, device: &impl AsDevice, port: usize) -> Result<()> {
        let p = self.register(device.as_device(), port)?;
        if self.exposed.contains(&p) {
            return Err(Error::PortInUse(p));
        }
        self.exposed.push(p);
        self.invalidate();
        Ok(())
    }

    /// Drop the most recently exposed port
    pub fn remove_last_port(&mut self) -> Option<Port> {
        let p = self.exposed.pop();
        if p.is_some() {
            self.invalidate();
        }
        p
    }

    /// Exposed ports in circuit order
    pub fn exposed_ports(&self) -> &[Port] {
        &self.exposed
    }

    /// Evaluate members at a local temperature instead of the ambient one
    pub fn set_temperature(&mut self, temperature: Option<Rc<Parameter>>) {
        self.temperature = temperature;
        self.cache.clear();
    }

    /// Number of member devices
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn build(&self) -> Result<MergeTree> {
        let mut tree = MergeTree {
            nodes: Vec::with_capacity(2 * self.devices.len()),
            root: None,
            exposure: Vec::new(),
        };
        let mut live: Vec<NodeId> = Vec::with_capacity(self.devices.len());
        for device in &self.devices {
            let ports = (0..device.size()).map(|i| Port::new(device.id(), i)).collect();
            let id = tree.push(Node {
                kind: NodeKind::Leaf(Rc::clone(device)),
                ports,
                noisy: device.flags().noise,
            });
            live.push(id);
        }

        for &(p1, p2) in &self.connections {
            tree.connect(&mut live, p1, p2)?;
        }

        // Disconnected pieces are merged by block union
        while let &[.., a, b] = live.as_slice() {
            live.truncate(live.len() - 2);
            live.push(tree.union(a, b));
        }
        tree.root = live.pop();

        let root_ports: &[Port] = match tree.root {
            Some(root) => &tree.nodes[root].ports,
            None => &[],
        };
        if root_ports.len() != self.exposed.len() {
            return Err(Error::PortCountMismatch {
                expected: self.exposed.len(),
                actual: root_ports.len(),
            });
        }
        let mut exposure = Vec::with_capacity(self.exposed.len());
        let mut used = vec![false; root_ports.len()];
        for port in &self.exposed {
            let index = root_ports
                .iter()
                .position(|p| p == port)
                .ok_or(Error::UnknownPort(*port))?;
            // Exposure must be a permutation of the root ports
            if std::mem::replace(&mut used[index], true) {
                return Err(Error::PortInUse(*port));
            }
            exposure.push(index);
        }
        tree.exposure = exposure;

        log::debug!(
            "circuit {}: built merge tree with {} nodes, {} ports",
            self.id.value(),
            tree.nodes.len(),
            tree.exposure.len()
        );
        Ok(tree)
    }

    fn merge_tree(&self) -> Result<Rc<MergeTree>> {
        if let Some(tree) = self.tree.borrow().as_ref() {
            return Ok(Rc::clone(tree));
        }
        let tree = Rc::new(self.build()?);
        *self.tree.borrow_mut() = Some(Rc::clone(&tree));
        Ok(tree)
    }

    /// Build the merge tree now, reporting topology errors early
    pub fn validate(&self) -> Result<()> {
        self.merge_tree().map(|_| ())
    }
}

impl Device for Circuit {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn size(&self) -> usize {
        self.exposed.len()
    }

    fn flags(&self) -> DeviceFlags {
        self.devices
            .iter()
            .fold(DeviceFlags::NONE, |acc, d| acc | d.flags())
    }

    fn compute(&self, ctx: &EvalContext, mode: ComputeMode) -> Result<ScatteringData> {
        let tree = self.merge_tree()?;
        let local;
        let ctx = match &self.temperature {
            Some(t) => {
                local = ctx.with_temperature(t.get()?);
                &local
            }
            None => ctx,
        };
        let mut data = match tree.root {
            Some(root) => tree.eval(root, ctx, mode)?.permuted(&tree.exposure),
            None => ScatteringData::new(0),
        };
        data.z_norm = ctx.z_normal();
        Ok(data)
    }

    fn cache(&self) -> &DataCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{Branch, Load, SeriesImpedance};
    use approx::assert_relative_eq;

    #[test]
    fn test_two_resistors_cascade() {
        let r1 = Rc::new(SeriesImpedance::resistor(30.0));
        let r2 = Rc::new(SeriesImpedance::resistor(70.0));
        let mut c = Circuit::new();
        c.connect(&r1, 1, &r2, 0).unwrap();
        c.add_port(&r1, 0).unwrap();
        c.add_port(&r2, 1).unwrap();

        let ctx = EvalContext::new(1e9, 290.0, 50.0);
        let d = c.get_data(&ctx, ComputeMode::Full).unwrap();
        // 100 Ohm in series: S11 = 1/2
        assert_relative_eq!(d.s[[0, 0]].re, 0.5, epsilon = 1e-14);
        assert_relative_eq!(d.s[[1, 0]].re, 0.5, epsilon = 1e-14);
    }

    #[test]
    fn test_exposure_order_is_honoured() {
        let load = Rc::new(Load::resistor(150.0));
        let thru = Rc::new(SeriesImpedance::resistor(0.0));
        let mut c = Circuit::new();
        c.add_port(&thru, 0).unwrap();
        c.add_port(&load, 0).unwrap();
        c.add_port(&thru, 1).unwrap();
        let d = c.get_data(&EvalContext::default(), ComputeMode::Full).unwrap();
        assert_eq!(d.size(), 3);
        assert_relative_eq!(d.s[[1, 1]].re, 0.5, epsilon = 1e-15);
        assert_relative_eq!(d.s[[0, 2]].re, 1.0, epsilon = 1e-15);
        assert_relative_eq!(d.s[[0, 1]].re, 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_double_connection_is_fatal() {
        let a = Rc::new(Branch::new(3));
        let b = Rc::new(Load::matched());
        let d = Rc::new(Load::matched());
        let mut c = Circuit::new();
        c.connect(&a, 0, &b, 0).unwrap();
        c.connect(&a, 0, &d, 0).unwrap();
        assert!(matches!(c.validate(), Err(Error::PortInUse(_))));
    }

    #[test]
    fn test_self_and_out_of_range_connections() {
        let a = Rc::new(Branch::new(3));
        let mut c = Circuit::new();
        assert!(matches!(c.connect(&a, 1, &a, 1), Err(Error::SelfConnection(_))));
        assert!(matches!(c.connect(&a, 3, &a, 1), Err(Error::UnknownPort(_))));
    }

    #[test]
    fn test_unexposed_port_is_count_mismatch() {
        let a = Rc::new(Branch::new(3));
        let mut c = Circuit::new();
        c.add_port(&a, 0).unwrap();
        c.add_port(&a, 1).unwrap();
        assert!(matches!(
            c.get_data(&EvalContext::default(), ComputeMode::Full),
            Err(Error::PortCountMismatch { expected: 2, actual: 3 })
        ));
        c.add_port(&a, 2).unwrap();
        assert!(c.validate().is_ok());
        assert_eq!(c.remove_last_port(), Some(Port::new(a.id(), 2)));
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_port_exposed_twice_is_rejected() {
        let r = Rc::new(SeriesImpedance::resistor(30.0));
        let mut c = Circuit::new();
        c.add_port(&r, 0).unwrap();
        assert!(matches!(c.add_port(&r, 0), Err(Error::PortInUse(_))));
        assert_eq!(c.size(), 1);

        c.add_port(&r, 1).unwrap();
        let d = c.get_data(&EvalContext::default(), ComputeMode::Full).unwrap();
        // 30 Ohm in series: S21 = 100 / 130
        assert_relative_eq!(d.s[[1, 0]].re, 100.0 / 130.0, epsilon = 1e-14);
    }

    /// Thru with gain flagged but noise not flagged; its C must be ignored
    struct QuietAmplifier {
        id: DeviceId,
        cache: DataCache,
    }

    impl Device for QuietAmplifier {
        fn id(&self) -> DeviceId {
            self.id
        }
        fn size(&self) -> usize {
            2
        }
        fn flags(&self) -> DeviceFlags {
            DeviceFlags {
                active: true,
                ..DeviceFlags::NONE
            }
        }
        fn compute(&self, _ctx: &EvalContext, _mode: ComputeMode) -> Result<ScatteringData> {
            let mut d = ScatteringData::new(2);
            d.s[[1, 0]] = num_complex::Complex64::new(2.0, 0.0);
            d.c.fill(num_complex::Complex64::new(1.0, 0.0));
            Ok(d)
        }
        fn cache(&self) -> &DataCache {
            &self.cache
        }
    }

    #[test]
    fn test_only_noise_flag_selects_noise_case() {
        let amp = Rc::new(QuietAmplifier {
            id: DeviceId::next(),
            cache: DataCache::new(),
        });
        let load = Rc::new(Load::resistor(150.0));
        let mut c = Circuit::new();
        c.connect(&amp, 1, &load, 0).unwrap();
        c.add_port(&amp, 0).unwrap();
        assert!(c.flags().active);

        let d = c.get_data(&EvalContext::new(0.0, 290.0, 50.0), ComputeMode::Full).unwrap();
        // The load's noise cannot reach port 0 through S12 = 0
        assert_eq!(d.size(), 1);
        assert_eq!(d.c[[0, 0]].re, 0.0);
    }

    #[test]
    fn test_local_temperature() {
        let load = Rc::new(Load::resistor(150.0));
        let mut c = Circuit::new();
        c.add_port(&load, 0).unwrap();
        c.set_temperature(Some(Parameter::new(20.0)));
        let ctx = EvalContext::new(0.0, 300.0, 50.0);
        let d = c.get_data(&ctx, ComputeMode::Full).unwrap();
        let kt = crate::constants::BOLTZMANN * 20.0;
        assert_relative_eq!(d.c[[0, 0]].re, 0.75 * kt, max_relative = 1e-12);
        // The parent context is untouched
        assert_eq!(ctx.temperature(), 300.0);
    }

    #[test]
    fn test_empty_circuit() {
        let c = Circuit::new();
        let d = c.get_data(&EvalContext::default(), ComputeMode::Full).unwrap();
        assert_eq!(d.size(), 0);
    }
}

//! The `port[:targetPort][/protocol]` shorthand for service ports.
use std::{num::ParseIntError, str::FromStr};

use k8s_openapi::{
    api::core::v1::ServicePort, apimachinery::pkg::util::intstr::IntOrString,
};
use snafu::{ResultExt, Snafu};
use strum::{Display, EnumString};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Snafu)]
pub enum Error {
    #[snafu(display(
        "invalid port mapping {mapping:?}, expected the form port[:targetPort][/protocol]"
    ))]
    InvalidSyntax { mapping: String },

    #[snafu(display("invalid {field} {value:?} in port mapping {mapping:?}"))]
    ParsePort {
        source: ParseIntError,
        field: &'static str,
        value: String,
        mapping: String,
    },

    #[snafu(display(
        "invalid protocol {protocol:?} in port mapping {mapping:?}, expected TCP or UDP"
    ))]
    InvalidProtocol { protocol: String, mapping: String },
}

#[derive(Clone, Copy, Debug, Default, Display, EnumString, PartialEq, Eq)]
pub enum Protocol {
    #[default]
    #[strum(serialize = "TCP")]
    Tcp,
    #[strum(serialize = "UDP")]
    Udp,
}

/// A parsed port mapping.
///
/// # Example
///
/// ```
/// use kedge::spec::port_mapping::{PortMapping, Protocol};
///
/// let mapping: PortMapping = "8080:80/UDP".parse().unwrap();
/// assert_eq!(mapping, PortMapping { port: 8080, target_port: 80, protocol: Protocol::Udp });
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortMapping {
    pub port: i32,
    pub target_port: i32,
    pub protocol: Protocol,
}

impl FromStr for PortMapping {
    type Err = Error;

    fn from_str(mapping: &str) -> Result<Self> {
        let parse_port = |value: &str, field: &'static str| {
            value.parse::<i32>().context(ParsePortSnafu {
                field,
                value,
                mapping,
            })
        };

        let (ports, protocol) = match mapping.split('/').collect::<Vec<_>>()[..] {
            [ports] => (ports, Protocol::default()),
            [ports, protocol] => (
                ports,
                protocol.parse().map_err(|_| Error::InvalidProtocol {
                    protocol: protocol.to_owned(),
                    mapping: mapping.to_owned(),
                })?,
            ),
            _ => return InvalidSyntaxSnafu { mapping }.fail(),
        };

        let (port, target_port) = match ports.split(':').collect::<Vec<_>>()[..] {
            [port] => {
                let port = parse_port(port, "port")?;
                (port, port)
            }
            [port, target_port] => (
                parse_port(port, "port")?,
                parse_port(target_port, "targetPort")?,
            ),
            _ => return InvalidSyntaxSnafu { mapping }.fail(),
        };

        Ok(Self {
            port,
            target_port,
            protocol,
        })
    }
}

impl From<PortMapping> for ServicePort {
    fn from(mapping: PortMapping) -> Self {
        Self {
            port: mapping.port,
            target_port: Some(IntOrString::Int(mapping.target_port)),
            protocol: Some(mapping.protocol.to_string()),
            ..Self::default()
        }
    }
}

/// Parses a port mapping into a service port.
///
/// Integer values, as written by `portMappings: [8080]`, are treated like their textual form.
pub fn parse_port_mapping(mapping: &IntOrString) -> Result<ServicePort> {
    let mapping = match mapping {
        IntOrString::Int(port) => port.to_string(),
        IntOrString::String(mapping) => mapping.clone(),
    };
    mapping.parse::<PortMapping>().map(ServicePort::from)
}

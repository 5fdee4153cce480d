use std::{
    collections::HashMap,
    io::{self, Cursor},
    time::Duration,
};

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use dm_types::{ImageRequest, ImageResponse, ImageType, Position, VelocityZ};
use rmpv::Value;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tracing::*;

use super::VehicleInterface;
use crate::VehicleError;

const REQUEST: u64 = 0;
const RESPONSE: u64 = 1;

/// Margin in degrees within which a yaw rotation counts as complete.
const YAW_MARGIN: f32 = 5.0;

/// Client for a vehicle controller speaking msgpack-rpc over TCP.
///
/// Requests are `[0, msgid, method, params]` and responses
/// `[1, msgid, error, result]`. Only one request is awaited at a time; a
/// response carrying any other msgid belongs to a request nobody waits for
/// anymore (a non-blocking velocity command, or one that timed out) and is
/// dropped. A rejection of a non-blocking command is held back and returned
/// by the next control command; queries never see it.
pub struct RpcVehicleInterface {
    address: String,
    vehicle_name: String,
    stream: Option<TcpStream>,
    buf: BytesMut,
    next_id: u32,
    /// Requests sent without waiting for their reply, by msgid.
    unacked: HashMap<u32, &'static str>,
    rejected: Option<VehicleError>,
}

impl RpcVehicleInterface {
    pub fn new(address: impl Into<String>, vehicle_name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            vehicle_name: vehicle_name.into(),
            stream: None,
            buf: BytesMut::with_capacity(64 * 1024),
            next_id: 0,
            unacked: HashMap::new(),
            rejected: None,
        }
    }

    fn vehicle(&self) -> Value {
        Value::from(self.vehicle_name.as_str())
    }

    /// Sends a request and returns its msgid without waiting for the reply.
    async fn send(
        &mut self,
        op: &'static str,
        method: &'static str,
        params: Vec<Value>,
    ) -> Result<u32, VehicleError> {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let message = Value::Array(vec![
            Value::from(REQUEST),
            Value::from(id),
            Value::from(method),
            Value::Array(params),
        ]);

        let mut bytes = Vec::with_capacity(128);
        rmpv::encode::write_value(&mut bytes, &message)
            .map_err(|err| VehicleError::protocol(op, err))?;

        trace!("sending {method} (msgid {id})");

        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| VehicleError::connection("not connected"))?;

        if let Err(err) = stream.write_all(&bytes).await {
            self.stream = None;
            return Err(VehicleError::connection(format!(
                "failed to send {method}: {err}"
            )));
        }

        Ok(id)
    }

    /// Waits for the response to request `id`.
    async fn recv(&mut self, op: &'static str, id: u32) -> Result<Value, VehicleError> {
        loop {
            let message = self.recv_message(op).await?;

            let parts = match message {
                Value::Array(parts) if parts.len() == 4 => parts,
                other => {
                    return Err(VehicleError::protocol(
                        op,
                        format!("malformed message {other}"),
                    ))
                }
            };

            if parts[0].as_u64() != Some(RESPONSE) {
                debug!("ignoring non-response message of type {}", parts[0]);
                continue;
            }

            let msgid = parts[1].as_u64().and_then(|msgid| u32::try_from(msgid).ok());

            let mut parts = parts.into_iter().skip(2);
            let error = parts.next().unwrap_or(Value::Nil);
            let result = parts.next().unwrap_or(Value::Nil);

            match msgid {
                Some(msgid) if msgid == id => {}
                Some(msgid) => {
                    self.stale_response(msgid, &error);
                    continue;
                }
                None => {
                    warn!("dropping response without a valid msgid");
                    continue;
                }
            }

            if !error.is_nil() {
                return Err(VehicleError::Rejected {
                    op,
                    reason: error_reason(&error),
                });
            }

            return Ok(result);
        }
    }

    fn stale_response(&mut self, msgid: u32, error: &Value) {
        let op = self.unacked.remove(&msgid);

        if error.is_nil() {
            trace!("dropping late response to msgid {msgid}");
            return;
        }

        let reason = error_reason(error);
        match op {
            Some(op) => {
                warn!("vehicle rejected {op}: {reason}");
                if self.rejected.is_none() {
                    self.rejected = Some(VehicleError::Rejected { op, reason });
                }
            }
            None => warn!("late response to msgid {msgid} carried an error: {reason}"),
        }
    }

    /// Reads one complete msgpack value off the stream.
    async fn recv_message(&mut self, op: &'static str) -> Result<Value, VehicleError> {
        loop {
            if !self.buf.is_empty() {
                let mut cursor = Cursor::new(&self.buf[..]);

                match rmpv::decode::read_value(&mut cursor) {
                    Ok(value) => {
                        let consumed = cursor.position() as usize;
                        self.buf.advance(consumed);
                        return Ok(value);
                    }
                    // need more bytes
                    Err(err) if is_incomplete(&err) => {}
                    Err(err) => {
                        warn!("unparseable data from vehicle ({err}), discarding buffer");
                        self.buf.clear();
                        return Err(VehicleError::protocol(op, err));
                    }
                }
            }

            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| VehicleError::connection("not connected"))?;

            match stream.read_buf(&mut self.buf).await {
                Ok(0) => {
                    self.stream = None;
                    return Err(VehicleError::connection("vehicle closed the connection"));
                }
                Ok(n) => trace!("read {n} bytes from vehicle"),
                Err(err) => {
                    self.stream = None;
                    return Err(VehicleError::connection(format!("read failed: {err}")));
                }
            }
        }
    }

    async fn call(
        &mut self,
        op: &'static str,
        method: &'static str,
        params: Vec<Value>,
    ) -> Result<Value, VehicleError> {
        let id = self.send(op, method, params).await?;
        self.recv(op, id).await
    }

    /// Calls a method that changes what the vehicle does. Fails with a held
    /// back rejection of an earlier non-blocking command if one came in.
    async fn command(
        &mut self,
        op: &'static str,
        method: &'static str,
        params: Vec<Value>,
    ) -> Result<Value, VehicleError> {
        self.take_rejected()?;
        let result = self.call(op, method, params).await?;
        self.take_rejected()?;

        Ok(result)
    }

    fn take_rejected(&mut self) -> Result<(), VehicleError> {
        match self.rejected.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Calls a method whose result reports completion as a boolean. `false`
    /// means the vehicle gave up before finishing.
    async fn call_completion(
        &mut self,
        op: &'static str,
        method: &'static str,
        params: Vec<Value>,
        timeout: Duration,
    ) -> Result<(), VehicleError> {
        match self.command(op, method, params).await? {
            Value::Boolean(false) => Err(VehicleError::CommandTimeout { op, timeout }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl VehicleInterface for RpcVehicleInterface {
    async fn connect(&mut self) -> Result<(), VehicleError> {
        debug!("connecting to vehicle at {}", self.address);

        let stream = TcpStream::connect(&self.address).await.map_err(|err| {
            VehicleError::connection(format!("could not reach {}: {err}", self.address))
        })?;

        stream
            .set_nodelay(true)
            .map_err(|err| VehicleError::connection(format!("failed to configure socket: {err}")))?;

        info!("connected to vehicle at {}", self.address);

        self.stream = Some(stream);
        self.buf.clear();
        self.unacked.clear();
        self.rejected = None;

        Ok(())
    }

    async fn confirm_connection(&mut self) -> Result<(), VehicleError> {
        match self.call("confirm_connection", "ping", vec![]).await {
            Ok(Value::Boolean(true)) => Ok(()),
            Ok(other) => Err(VehicleError::connection(format!(
                "vehicle did not acknowledge ping (got {other})"
            ))),
            Err(err) => Err(VehicleError::connection(err)),
        }
    }

    async fn enable_api_control(&mut self, enabled: bool) -> Result<(), VehicleError> {
        let params = vec![Value::from(enabled), self.vehicle()];
        self.command("enable_api_control", "enableApiControl", params)
            .await?;
        Ok(())
    }

    async fn arm_disarm(&mut self, arm: bool) -> Result<(), VehicleError> {
        let params = vec![Value::from(arm), self.vehicle()];
        match self.command("arm_disarm", "armDisarm", params).await? {
            Value::Boolean(false) => Err(VehicleError::Rejected {
                op: "arm_disarm",
                reason: format!("vehicle refused to {}", if arm { "arm" } else { "disarm" }),
            }),
            _ => Ok(()),
        }
    }

    async fn takeoff(&mut self, timeout: Duration) -> Result<(), VehicleError> {
        let params = vec![Value::from(timeout.as_secs_f32()), self.vehicle()];
        self.call_completion("takeoff", "takeoff", params, timeout)
            .await
    }

    async fn land(&mut self, timeout: Duration) -> Result<(), VehicleError> {
        let params = vec![Value::from(timeout.as_secs_f32()), self.vehicle()];
        self.call_completion("land", "land", params, timeout).await
    }

    async fn hover(&mut self) -> Result<(), VehicleError> {
        let params = vec![self.vehicle()];
        self.command("hover", "hover", params).await?;
        Ok(())
    }

    async fn rotate_to_yaw(&mut self, angle: f32, timeout: Duration) -> Result<(), VehicleError> {
        let params = vec![
            Value::from(angle),
            Value::from(timeout.as_secs_f32()),
            Value::from(YAW_MARGIN),
            self.vehicle(),
        ];
        self.call_completion("rotate_to_yaw", "rotateToYaw", params, timeout)
            .await
    }

    async fn move_by_velocity_z(&mut self, command: VelocityZ) -> Result<(), VehicleError> {
        let yaw_mode = Value::Map(vec![
            (Value::from("is_rate"), Value::from(command.yaw_mode.is_rate)),
            (
                Value::from("yaw_or_rate"),
                Value::from(command.yaw_mode.yaw_or_rate),
            ),
        ]);

        let params = vec![
            Value::from(command.vx),
            Value::from(command.vy),
            Value::from(command.z),
            Value::from(command.duration.as_secs_f32()),
            Value::from(command.drivetrain.code()),
            yaw_mode,
            self.vehicle(),
        ];

        self.take_rejected()?;

        // the controller only replies once the command has run its course, so
        // the reply is never awaited
        let id = self
            .send("move_by_velocity_z", "moveByVelocityZ", params)
            .await?;
        self.unacked.insert(id, "move_by_velocity_z");

        Ok(())
    }

    async fn get_position(&mut self) -> Result<Position, VehicleError> {
        let params = vec![self.vehicle()];
        let state = self
            .call("get_position", "getMultirotorState", params)
            .await?;

        let position = field(&state, "kinematics_estimated")
            .and_then(|k| field(k, "position"))
            .ok_or_else(|| VehicleError::protocol("get_position", "state has no position"))?;

        let coord = |name| {
            field(position, name)
                .and_then(number)
                .map(|v| v as f32)
                .ok_or_else(|| {
                    VehicleError::protocol("get_position", format!("position has no {name}"))
                })
        };

        Ok(Position::new(coord("x_val")?, coord("y_val")?, coord("z_val")?))
    }

    async fn sim_get_images(
        &mut self,
        requests: Vec<ImageRequest>,
    ) -> Result<Vec<ImageResponse>, VehicleError> {
        let requests = requests.iter().map(encode_image_request).collect();
        let params = vec![Value::Array(requests), self.vehicle()];

        let responses = self
            .call("sim_get_images", "simGetImages", params)
            .await?;

        match responses {
            Value::Array(responses) => responses.iter().map(decode_image_response).collect(),
            Value::Nil => Ok(vec![]),
            other => Err(VehicleError::protocol(
                "sim_get_images",
                format!("expected a list of images, got {other}"),
            )),
        }
    }

    async fn reset(&mut self) -> Result<(), VehicleError> {
        self.command("reset", "reset", vec![]).await?;
        Ok(())
    }

    fn abandon(&mut self) {
        if self.stream.take().is_some() {
            warn!("dropping connection to {} after abandoned request", self.address);
        }

        self.buf.clear();
        self.unacked.clear();
    }
}

fn error_reason(error: &Value) -> String {
    match error.as_str() {
        Some(reason) => reason.to_owned(),
        None => error.to_string(),
    }
}

fn is_incomplete(err: &rmpv::decode::Error) -> bool {
    match err {
        rmpv::decode::Error::InvalidMarkerRead(err) | rmpv::decode::Error::InvalidDataRead(err) => {
            err.kind() == io::ErrorKind::UnexpectedEof
        }
        _ => false,
    }
}

fn field<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    value
        .as_map()?
        .iter()
        .find(|(key, _)| key.as_str() == Some(name))
        .map(|(_, value)| value)
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::F32(v) => Some(*v as f64),
        Value::F64(v) => Some(*v),
        Value::Integer(v) => v.as_f64(),
        _ => None,
    }
}

fn encode_image_request(request: &ImageRequest) -> Value {
    Value::Map(vec![
        (
            Value::from("camera_name"),
            Value::from(request.camera_name.as_str()),
        ),
        (Value::from("image_type"), Value::from(request.image_type.code())),
        (
            Value::from("pixels_as_float"),
            Value::from(request.pixels_as_float),
        ),
        (Value::from("compress"), Value::from(request.compress)),
    ])
}

fn decode_image_response(value: &Value) -> Result<ImageResponse, VehicleError> {
    const OP: &str = "sim_get_images";

    if value.as_map().is_none() {
        return Err(VehicleError::protocol(OP, "image response is not a map"));
    }

    let dimension = |name| {
        field(value, name)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| VehicleError::protocol(OP, format!("image response has no {name}")))
    };

    let image_data_float = match field(value, "image_data_float") {
        Some(Value::Array(values)) => values
            .iter()
            .map(|v| number(v).map(|v| v as f32))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| VehicleError::protocol(OP, "non-numeric float pixel"))?,
        _ => vec![],
    };

    let image_data_uint8 = match field(value, "image_data_uint8") {
        Some(Value::Binary(bytes)) => bytes.clone(),
        Some(Value::Array(values)) => values
            .iter()
            .map(|v| v.as_u64().and_then(|v| u8::try_from(v).ok()))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| VehicleError::protocol(OP, "invalid byte pixel"))?,
        _ => vec![],
    };

    Ok(ImageResponse {
        camera_name: field(value, "camera_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        image_type: field(value, "image_type")
            .and_then(Value::as_i64)
            .and_then(ImageType::from_code),
        width: dimension("width")?,
        height: dimension("height")?,
        time_stamp: field(value, "time_stamp")
            .and_then(Value::as_u64)
            .unwrap_or_default(),
        pixels_as_float: field(value, "pixels_as_float")
            .and_then(Value::as_bool)
            .unwrap_or(!image_data_float.is_empty()),
        image_data_float,
        image_data_uint8,
        message: field(value, "message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
    })
}

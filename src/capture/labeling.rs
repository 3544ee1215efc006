//! # labeling
//!
//! KITTI labels for the vehicles seen by the ego camera.
//!
//! Label locations are the KITTI bottom centre of the box, not its geometric centre.

use crate::{
    constants::{FORWARD_DOT_THRESHOLD, MAX_LABEL_DISTANCE_M},
    geometry::{
        camera::pinhole_camera::{clamp_bbox_to_image, PinholeCamera},
        transform::{Location, Transform},
        utils::{normalize_angle, normalize_angle_deg},
    },
    label::{KittiLabel, ObjectType},
    simulator::ActorSnapshot,
};

/// Whether `npc` lies ahead of `ego` along its forward vector.
pub fn is_in_front(ego: &Transform, npc: &Transform) -> bool {
    let ray = npc.location - ego.location;
    ego.forward_vector().dot(&ray) > FORWARD_DOT_THRESHOLD
}

/// Actor origin raised by half the box height.
pub fn center_world_position(actor: &ActorSnapshot) -> Location {
    actor.transform.location + Location::new(0., 0., actor.bounding_box.extent.z)
}

/// Whether a world point projects strictly inside the image.
pub fn is_in_image(camera: &PinholeCamera, point: &Location) -> bool {
    camera.contains_world_point(&point.to_array().view())
}

/// Heading of `npc` around the camera y-axis, in `(-π, π]`.
pub fn rotation_y(ego_yaw_deg: f32, npc_yaw_deg: f32) -> f32 {
    normalize_angle_deg(ego_yaw_deg - npc_yaw_deg + 90.).to_radians()
}

/// Observation angle of an object at `location` (camera frame), in `(-π, π]`.
pub fn observation_angle(rotation_y: f32, location: [f32; 3]) -> f32 {
    normalize_angle(rotation_y - location[0].atan2(location[2]))
}

/// Image box `[left, top, right, bottom]` of the actor's projected vertices.
///
/// Vertices behind the camera are ignored. `None` if the whole box is behind it.
pub fn project_bbox(camera: &PinholeCamera, actor: &ActorSnapshot) -> Option<[f32; 4]> {
    let vertices = actor.bounding_box.world_vertices(&actor.transform);
    let (uvz, _, _) = camera.project_world_to_image(&vertices.view());
    uvz.outer_iter()
        .filter(|p| p[2] > 0.)
        .fold(None, |bbox, p| {
            let [left, top, right, bottom] = bbox.unwrap_or([
                f32::INFINITY,
                f32::INFINITY,
                f32::NEG_INFINITY,
                f32::NEG_INFINITY,
            ]);
            Some([left.min(p[0]), top.min(p[1]), right.max(p[0]), bottom.max(p[1])])
        })
}

/// Fraction of the box area outside the image, in `[0, 1]`.
pub fn truncation(bbox: [f32; 4], clamped: [f32; 4]) -> f32 {
    let area = |b: [f32; 4]| (b[2] - b[0]).max(0.) * (b[3] - b[1]).max(0.);
    let full = area(bbox);
    if full <= 0. {
        return 0.;
    }
    (1. - area(clamped) / full).clamp(0., 1.)
}

/// Label of `npc` as seen from `ego`'s camera, if it passes the visibility filters.
///
/// Filters: ahead of the ego vehicle, closer than the labeling distance and with its
/// centre projecting inside the image.
pub fn label_actor(
    camera: &PinholeCamera,
    ego: &Transform,
    npc: &ActorSnapshot,
) -> Option<KittiLabel> {
    if !is_in_front(ego, &npc.transform)
        || npc.transform.location.distance(&ego.location) >= MAX_LABEL_DISTANCE_M
    {
        return None;
    }
    let center = center_world_position(npc);
    if !is_in_image(camera, &center) {
        return None;
    }

    let bottom = npc.transform.transform_point(
        &(npc.bounding_box.location - Location::new(0., 0., npc.bounding_box.extent.z)),
    );
    let location = camera.world_point_to_camera(&bottom.to_array().view());
    let bbox = project_bbox(camera, npc)?;
    let clamped = clamp_bbox_to_image(bbox, camera.width_px(), camera.height_px());
    let (length, width, height) = npc.bounding_box.dimensions();
    let rotation_y = rotation_y(ego.rotation.yaw, npc.transform.rotation.yaw);

    let mut label = KittiLabel::new(ObjectType::Car);
    label.truncated = truncation(bbox, clamped);
    label.alpha = observation_angle(rotation_y, location);
    label.bbox = clamped;
    label.dimensions = [height, width, length];
    label.location = location;
    label.rotation_y = rotation_y;
    Some(label)
}

/// Labels of every vehicle other than `ego` visible in the camera.
pub fn label_frame(
    camera: &PinholeCamera,
    ego: &ActorSnapshot,
    actors: &[ActorSnapshot],
) -> Vec<KittiLabel> {
    actors
        .iter()
        .filter(|npc| npc.id != ego.id && npc.is_vehicle())
        .filter_map(|npc| label_actor(camera, &ego.transform, npc))
        .collect()
}

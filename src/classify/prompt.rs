/// Instruction sent alongside every frame.
///
/// The model is asked to stay inside the property's focus areas, report only
/// people, vehicles and animals, and answer with a single JSON object.
pub const DETECTION_PROMPT: &str = r#"Analyze this outdoor security camera image for activity.

FOCUS ON THESE AREAS ONLY:
1. The driveway area (typically to the right side of frame)
2. Vehicles parked directly in front of the property
3. People or animals in front of the property or on the driveway

DETECT AND REPORT:
- People walking, standing, or approaching
- Vehicles (cars, trucks, bikes, delivery trucks)
- Animals (pets, wildlife)

IGNORE:
- Activity on the street/road (not on property)
- Activity on neighboring properties
- Background movement (trees, clouds, flags)
- Static decorations (Christmas lights, deer statues, lawn ornaments)

For each detected object IN THE FOCUS AREAS, specify:
- type: "person", "vehicle", or "animal"
- location: "driveway", "in_front", or "walking_by"
- description: Brief description of what they're doing/where they are
- confidence: 0.0-1.0

Return ONLY a JSON object:
{
    "detections": [
        {
            "type": "person|vehicle|animal",
            "location": "driveway|in_front|walking_by",
            "description": "brief description",
            "confidence": 0.0-1.0
        }
    ],
    "summary": "brief summary"
}

If nothing is detected in the focus areas, return empty detections array.
"#;

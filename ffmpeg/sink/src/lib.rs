/*!
    Container muxing for the capture encoder.

    This crate handles the output side of the pipeline. It takes encoded
    packets from the encoders and writes them into a container file, picking
    the container from the file extension and falling back to MPEG-TS when
    the extension is missing or unknown.

    Opening a sink is staged, because encoders need to know whether the
    container wants global headers before they are opened, and the sink
    needs the opened encoders' extradata before it can write its header:

    ```ignore
    use ffmpeg_sink::{Sink, SinkConfig};

    let mut sink = Sink::open("capture.mp4", SinkConfig::default())?;
    let global_header = sink.needs_global_header();

    // ... open encoders with `global_header` ...

    sink.add_video(&video_encoder.stream_info())?;
    sink.add_audio(&audio_encoder.stream_info())?;
    sink.write_header()?;

    for packet in packets {
        sink.write(&packet)?;
    }

    sink.finish()?;
    ```
*/

mod config;
mod sink;

pub use config::{ContainerFormat, SinkConfig};
pub use sink::Sink;

mod test_capture_frames;
